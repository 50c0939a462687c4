//! The shared session clipboard.

use std::io;

use vtwire::{Instruction, InstructionSink, StreamId};

/// The maximum number of bytes a clipboard may hold.
pub const CLIPBOARD_MAX_LENGTH: usize = 262_144;

/// A bounded clipboard buffer with an associated MIME type.
///
/// One clipboard is shared by a session and injected into the terminal at
/// creation; all access happens under a lock held by the caller.
#[derive(Debug)]
pub struct Clipboard {
    mimetype: String,
    buffer: Vec<u8>,
    capacity: usize,
}

impl Clipboard {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            mimetype: String::from("text/plain"),
            buffer: Vec::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard current contents and begin a transfer of the given type.
    pub fn reset(&mut self, mimetype: &str) {
        self.buffer.clear();
        self.mimetype.clear();
        self.mimetype.push_str(mimetype);
    }

    /// Append data, truncating at the clipboard's capacity.
    pub fn append(&mut self, data: &[u8]) {
        let remaining = self.capacity.saturating_sub(self.buffer.len());
        self.buffer.extend_from_slice(&data[..data.len().min(remaining)]);
    }

    /// Broadcast the clipboard contents as a stream transfer: a pipe
    /// carrying the MIME type, the data as a single blob, and an end
    /// marker. Empty clipboards transfer as an empty stream.
    ///
    /// # Errors
    ///
    /// Propagates sink failures to the caller (session-fatal).
    pub fn send(&self, stream: StreamId, sink: &mut dyn InstructionSink) -> io::Result<()> {
        sink.send(Instruction::Pipe {
            stream,
            mimetype: self.mimetype.clone(),
            name: String::from("clipboard"),
        })?;
        if !self.buffer.is_empty() {
            sink.send(Instruction::Blob {
                stream,
                data: self.buffer.clone(),
            })?;
        }
        sink.send(Instruction::End { stream })
    }
}

impl Default for Clipboard {
    fn default() -> Self {
        Self::new(CLIPBOARD_MAX_LENGTH)
    }
}

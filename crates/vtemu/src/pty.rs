//! The in-process pipe standing in for the PTY's input side.
//!
//! The emulator never manages a child process. Keystrokes, pastes and
//! protocol replies are written to a [`PtyWriter`]; the embedder's PTY
//! layer drains the matching [`PtyReader`] into the real child stdin.
//! Closing either end wakes blocked readers.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct PipeState {
    data: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

/// The write end of the PTY input pipe.
#[derive(Debug, Clone)]
pub struct PtyWriter {
    pipe: Arc<Pipe>,
}

/// The read end of the PTY input pipe. Reads block until data arrives or
/// the pipe is closed.
#[derive(Debug, Clone)]
pub struct PtyReader {
    pipe: Arc<Pipe>,
}

/// Create a connected reader/writer pair.
#[must_use]
pub fn pty_pipe() -> (PtyWriter, PtyReader) {
    let pipe = Arc::new(Pipe::default());
    (
        PtyWriter { pipe: pipe.clone() },
        PtyReader { pipe },
    )
}

impl PtyWriter {
    /// Close the pipe, waking any blocked reader. Further writes fail.
    pub fn close(&self) {
        let mut state = self.pipe.state.lock();
        state.closed = true;
        self.pipe.readable.notify_all();
    }
}

impl Write for PtyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.pipe.state.lock();
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "PTY input pipe closed",
            ));
        }
        state.data.extend(buf);
        self.pipe.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PtyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.pipe.state.lock();
        while state.data.is_empty() {
            if state.closed {
                return Ok(0);
            }
            self.pipe.readable.wait(&mut state);
        }

        let count = buf.len().min(state.data.len());
        for slot in buf.iter_mut().take(count) {
            *slot = state.data.pop_front().unwrap_or(0);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn write_then_read() {
        let (mut writer, mut reader) = pty_pipe();
        writer.write_all(b"hello").unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn read_blocks_until_write() {
        let (mut writer, mut reader) = pty_pipe();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4];
            let n = reader.read(&mut buf).unwrap();
            buf[..n].to_vec()
        });

        writer.write_all(b"ok").unwrap();
        assert_eq!(handle.join().unwrap(), b"ok");
    }

    #[test]
    fn close_unblocks_reader_with_eof() {
        let (writer, mut reader) = pty_pipe();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4];
            reader.read(&mut buf).unwrap()
        });

        writer.close();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn write_after_close_fails() {
        let (mut writer, _reader) = pty_pipe();
        writer.close();
        assert!(writer.write(b"x").is_err());
    }
}

//! Inbound streams: exclusive input redirection and the "argv" credential
//! side-channel.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::debug;
use vtwire::{AckStatus, Instruction, StreamId};

use crate::terminal::{TermState, Terminal};

/// Maximum bytes accepted for one argv parameter value.
const ARGV_MAX_LENGTH: usize = 4096;

/// Whether an inbound stream currently owns the terminal's input.
#[derive(Debug, Default)]
pub(crate) struct InputStreamState {
    pub(crate) stream: Option<StreamId>,
}

impl InputStreamState {
    pub(crate) fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

/// Connection parameters that may be updated over argv streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgvSetting {
    Username,
    Password,
}

/// A credential value in flight on one argv stream.
#[derive(Debug)]
pub(crate) struct ArgvReceiver {
    setting: ArgvSetting,
    buffer: Vec<u8>,
}

/// Credentials received over argv streams.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl TermState {
    fn send_ack(&mut self, stream: StreamId, message: &str, status: AckStatus) {
        let instruction = Instruction::Ack {
            stream,
            message: message.to_owned(),
            status,
        };
        if let Err(e) = self.sink.send(instruction) {
            debug!(error = %e, "failed to send stream ack");
        }
    }
}

impl Terminal {
    /// Open an inbound stream that takes exclusive ownership of terminal
    /// input. While it is open, key, mouse and data events are dropped.
    ///
    /// A second open while a stream is active keeps the existing stream
    /// and refuses the new one.
    pub fn input_stream_open(&self, stream: StreamId) -> AckStatus {
        let mut state = self.shared().state.lock();

        if state.input_stream.is_active() {
            state.send_ack(
                stream,
                "Terminal input is already being read from another stream.",
                AckStatus::ResourceConflict,
            );
            return AckStatus::ResourceConflict;
        }

        state.input_stream.stream = Some(stream);
        debug!("terminal input now exclusively from inbound stream");
        state.send_ack(stream, "Ready to receive input.", AckStatus::Success);
        AckStatus::Success
    }

    /// Write a blob received on the input stream to the PTY.
    pub fn input_stream_blob(&self, stream: StreamId, data: &[u8]) -> AckStatus {
        let mut state = self.shared().state.lock();

        if state.input_stream.stream != Some(stream) {
            state.send_ack(stream, "Stream is not open.", AckStatus::ClientForbidden);
            return AckStatus::ClientForbidden;
        }

        match state.pty.write_all(data) {
            Ok(()) => {
                state.send_ack(stream, "Data written to STDIN.", AckStatus::Success);
                AckStatus::Success
            }
            Err(e) => {
                debug!(error = %e, "inbound stream write to STDIN failed");
                state.send_ack(
                    stream,
                    "Attempt to write to STDIN failed.",
                    AckStatus::ServerError,
                );
                AckStatus::ServerError
            }
        }
    }

    /// Close the input stream, restoring normal user input.
    pub fn input_stream_end(&self, stream: StreamId) {
        let mut state = self.shared().state.lock();
        if state.input_stream.stream == Some(stream) {
            state.input_stream.stream = None;
            debug!("inbound stream closed; user input restored");
        }
    }

    /// Open an argv stream updating the named connection parameter. Only
    /// `username` and `password` may be updated; anything else is refused.
    pub fn argv_stream_open(&self, stream: StreamId, name: &str) -> AckStatus {
        let setting = match name {
            "username" => ArgvSetting::Username,
            "password" => ArgvSetting::Password,
            _ => {
                let mut state = self.shared().state.lock();
                state.send_ack(stream, "Not allowed.", AckStatus::ClientForbidden);
                return AckStatus::ClientForbidden;
            }
        };

        let mut state = self.shared().state.lock();
        state.argv_streams.insert(
            stream.0,
            ArgvReceiver {
                setting,
                buffer: Vec::new(),
            },
        );
        state.send_ack(stream, "Ready for updated parameter.", AckStatus::Success);
        AckStatus::Success
    }

    /// Append blob data to an open argv stream's value, truncating at the
    /// bounded length.
    pub fn argv_stream_blob(&self, stream: StreamId, data: &[u8]) {
        let mut state = self.shared().state.lock();
        if let Some(receiver) = state.argv_streams.get_mut(&stream.0) {
            let remaining = ARGV_MAX_LENGTH
                .saturating_sub(receiver.buffer.len())
                .saturating_sub(1);
            receiver
                .buffer
                .extend_from_slice(&data[..data.len().min(remaining)]);
        }
    }

    /// Close an argv stream, applying the received value and signalling
    /// any thread waiting for credentials.
    pub fn argv_stream_end(&self, stream: StreamId) {
        let receiver = {
            let mut state = self.shared().state.lock();
            state.argv_streams.remove(&stream.0)
        };
        let Some(receiver) = receiver else {
            return;
        };

        let value = String::from_utf8_lossy(&receiver.buffer).into_owned();

        let shared = self.shared();
        let mut credentials = shared.credentials.lock();
        match receiver.setting {
            ArgvSetting::Username => credentials.username = Some(value),
            ArgvSetting::Password => credentials.password = Some(value),
        }
        shared.credentials_cond.notify_all();
    }

    /// Block until the required credentials have arrived over argv
    /// streams, or the timeout elapses. Returns the credentials received
    /// so far in either case.
    pub fn wait_credentials(
        &self,
        need_username: bool,
        need_password: bool,
        timeout: Duration,
    ) -> Credentials {
        let shared = self.shared();
        let deadline = Instant::now() + timeout;

        let mut credentials = shared.credentials.lock();
        loop {
            let satisfied = (!need_username || credentials.username.is_some())
                && (!need_password || credentials.password.is_some());
            if satisfied {
                break;
            }
            if shared
                .credentials_cond
                .wait_until(&mut credentials, deadline)
                .timed_out()
            {
                break;
            }
        }

        credentials.clone()
    }
}

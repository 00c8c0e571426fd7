//! A scripted in-memory connector.
//!
//! Plays back preloaded shell output and releases canned replies when the
//! session writes a trigger string, which is enough to drive a [`Session`]
//! through logins, prompts, timeouts and link failures without a network.
//!
//! [`Session`]: crate::session::Session

use std::collections::VecDeque;
use std::io;

use crate::connector::Connector;
use crate::error::{ShellError, ShellResult};

/// How scripted writes fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    /// I/O fault while the link stays up.
    Fault(String),
    /// The remote end drops the link; the connector becomes disconnected.
    LinkLost { code: Option<u32>, message: String },
}

/// A connector that replays a script instead of talking to a server.
#[derive(Debug)]
pub struct MockConnector {
    connected: bool,
    logged_in: bool,
    credentials: Option<(String, String)>,
    input: VecDeque<u8>,
    replies: VecDeque<(Vec<u8>, Vec<u8>)>,
    written: Vec<u8>,
    scanned: usize,
    write_chunk: Option<usize>,
    idle_when_drained: bool,
    write_failure: Option<(usize, WriteFailure)>,
    write_calls: usize,
    last_error: String,
    last_error_code: Option<u32>,
    disconnects: usize,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// A connected, logged-out connector with no scripted output.
    pub fn new() -> Self {
        Self {
            connected: true,
            logged_in: false,
            credentials: None,
            input: VecDeque::new(),
            replies: VecDeque::new(),
            written: Vec::new(),
            scanned: 0,
            write_chunk: None,
            idle_when_drained: false,
            write_failure: None,
            write_calls: 0,
            last_error: String::new(),
            last_error_code: None,
            disconnects: 0,
        }
    }

    /// A connector whose link is already down.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    /// Start with an open shell.
    pub fn logged_in(mut self) -> Self {
        self.logged_in = true;
        self
    }

    /// Only accept this username/password pair.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Queue shell output that is readable right away.
    pub fn with_input(mut self, data: impl AsRef<[u8]>) -> Self {
        self.input.extend(data.as_ref().iter().copied());
        self
    }

    /// Once `trigger` shows up in the written bytes, make `reply` readable.
    ///
    /// Replies fire in registration order; each one fires once.
    pub fn on_write(mut self, trigger: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> Self {
        self.replies
            .push_back((trigger.as_ref().to_vec(), reply.as_ref().to_vec()));
        self
    }

    /// Accept at most `n` bytes per write call.
    pub fn with_write_chunk(mut self, n: usize) -> Self {
        self.write_chunk = Some(n);
        self
    }

    /// When the script runs dry, block like an idle link instead of
    /// reporting end-of-stream.
    pub fn idle_when_drained(mut self) -> Self {
        self.idle_when_drained = true;
        self
    }

    /// Fail every write call after the first `successful` ones.
    pub fn fail_writes_after(mut self, successful: usize, failure: WriteFailure) -> Self {
        self.write_failure = Some((successful, failure));
        self
    }

    /// Everything the session has written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Scripted output not yet read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// How many times `disconnect` tore down a live link.
    pub fn disconnect_count(&self) -> usize {
        self.disconnects
    }

    /// Simulate the remote end dropping the link.
    pub fn drop_link(&mut self, code: Option<u32>, message: &str) {
        self.connected = false;
        self.logged_in = false;
        self.last_error = message.to_string();
        self.last_error_code = code;
    }

    fn release_replies(&mut self) {
        while let Some((trigger, _)) = self.replies.front() {
            let haystack = &self.written[self.scanned..];
            let Some(pos) = find(haystack, trigger) else {
                break;
            };
            self.scanned += pos + trigger.len();
            if let Some((_, reply)) = self.replies.pop_front() {
                self.input.extend(reply);
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Connector for MockConnector {
    async fn login(&mut self, username: &str, password: &str) -> ShellResult<bool> {
        if !self.connected {
            return Err(ShellError::NotConnected);
        }
        if let Some((user, pass)) = &self.credentials {
            if user != username || pass != password {
                return Err(ShellError::Authentication(format!(
                    "unable to authenticate user {username}"
                )));
            }
        }
        self.logged_in = true;
        Ok(true)
    }

    async fn logout(&mut self) -> bool {
        if !self.logged_in {
            return false;
        }
        self.logged_in = false;
        true
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.disconnects += 1;
        }
        self.connected = false;
        self.logged_in = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    async fn read(&mut self) -> Option<u8> {
        if !(self.connected && self.logged_in) {
            return None;
        }
        match self.input.pop_front() {
            Some(byte) => Some(byte),
            None if self.idle_when_drained => std::future::pending().await,
            None => None,
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !(self.connected && self.logged_in) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no interactive shell",
            ));
        }

        let failure = match &self.write_failure {
            Some((successful, failure)) if self.write_calls >= *successful => Some(failure.clone()),
            _ => None,
        };
        match failure {
            Some(WriteFailure::Fault(message)) => {
                self.last_error = message.clone();
                return Err(io::Error::other(message));
            }
            Some(WriteFailure::LinkLost { code, message }) => {
                self.drop_link(code, &message);
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, message));
            }
            None => {}
        }
        self.write_calls += 1;

        let n = self.write_chunk.map_or(data.len(), |c| c.min(data.len()));
        self.written.extend_from_slice(&data[..n]);
        self.release_replies();
        Ok(n)
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn last_error_code(&self) -> Option<u32> {
        self.last_error_code
    }
}

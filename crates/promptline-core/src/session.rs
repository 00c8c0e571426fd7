//! Prompt-driven shell session.
//!
//! A `Session` wraps a connected [`Connector`], writes commands to the remote
//! shell and reads the output back byte by byte until the command prompt
//! appears. Output accumulates in a buffer that the caller drains explicitly
//! with [`Session::take_result`].

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::connector::Connector;
use crate::error::{ShellError, ShellResult};
use crate::log::{escape_controls, Logger};

/// How a [`Session::read_until`] call ended.
///
/// Failures still leave every byte read so far in the session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The output ended with the search string; carries the bytes read.
    Found(usize),
    /// The byte cap was reached; carries the bytes read.
    Limit(usize),
    /// The timeout elapsed first.
    TimedOut,
    /// The connector reported end-of-stream first.
    Eof,
    /// The session's cancellation token fired.
    Cancelled,
}

impl ReadOutcome {
    /// Bytes read on success, `None` on failure.
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Found(n) | Self::Limit(n) => Some(*n),
            Self::TimedOut | Self::Eof | Self::Cancelled => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.count().is_some()
    }
}

/// An interactive shell session bound to one connector.
///
/// Release it with [`Session::close`]; that logs out and disconnects the
/// connector, ignoring any failure on the way. `close` is the only release
/// path: dropping an unclosed session just logs a warning and leaves the
/// connector as it was. A session over a borrowed connector
/// (`Session<&mut C>`) dropped without `close` therefore leaves that
/// connector connected and logged in.
pub struct Session<C: Connector> {
    connector: C,
    eol: String,
    prompt: String,
    timeout: Duration,
    read_buffer: Vec<u8>,
    write_buffer: Vec<u8>,
    cancel: CancellationToken,
    logger: Logger,
    closed: bool,
}

impl<C: Connector> Session<C> {
    /// Bind a session to an already connected connector.
    pub fn new(connector: C, config: SessionConfig) -> ShellResult<Self> {
        Self::with_logger(connector, config, Logger::silent())
    }

    pub fn with_logger(connector: C, config: SessionConfig, logger: Logger) -> ShellResult<Self> {
        if !connector.is_connected() {
            logger.err("Session::new: connector state is disconnected");
            return Err(ShellError::NotConnected);
        }

        let timeout = config.timeout();
        logger.debug(format!(
            "Session::new: timeout {}s, prompt \"{}\"",
            timeout.as_secs(),
            escape_controls(&config.prompt)
        ));

        Ok(Self {
            connector,
            eol: config.eol,
            prompt: config.prompt,
            timeout,
            read_buffer: Vec::new(),
            write_buffer: Vec::new(),
            cancel: CancellationToken::new(),
            logger,
            closed: false,
        })
    }

    pub async fn login(&mut self, username: &str, password: &str) -> ShellResult<bool> {
        self.connector.login(username, password).await
    }

    /// Returns `false` when there was no shell to close.
    pub async fn logout(&mut self) -> bool {
        self.connector.logout().await
    }

    /// Run `command` and return everything up to and including the next prompt.
    ///
    /// Output is returned even when the prompt never showed up; the caller
    /// has to inspect the text to judge how the command went.
    pub async fn execute(&mut self, command: &str) -> ShellResult<String> {
        let mut line = String::with_capacity(command.len() + self.eol.len());
        line.push_str(command);
        line.push_str(&self.eol);
        self.write(line).await?;

        let prompt = self.prompt.clone();
        let outcome = self.read_until(Some(&prompt), None).await;
        if !outcome.is_success() {
            self.logger.debug(format!(
                "Session::execute: prompt not seen after command ({outcome:?})"
            ));
        }
        Ok(self.take_result())
    }

    /// Read output until it ends with `search_for`, `max_chars` bytes were
    /// read, or the timeout elapses.
    ///
    /// A match or the byte cap beats a timeout noticed after the same byte.
    /// `max_chars` of `None` or zero means no cap; an empty search string is
    /// the same as none. Whatever was read is appended to the session buffer
    /// on every path, failures included.
    pub async fn read_until(
        &mut self,
        search_for: Option<&str>,
        max_chars: Option<usize>,
    ) -> ReadOutcome {
        let needle = search_for.map(str::as_bytes).filter(|s| !s.is_empty());
        let cap = max_chars.unwrap_or(0);
        let deadline = Instant::now() + self.timeout;
        let cancel = self.cancel.clone();
        let mut run: Vec<u8> = Vec::new();

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ReadOutcome::Cancelled,
                byte = self.connector.read() => byte,
                _ = time::sleep_until(deadline) => break ReadOutcome::TimedOut,
            };
            let Some(byte) = next else {
                break ReadOutcome::Eof;
            };
            run.push(byte);

            if needle.is_some_and(|n| run.ends_with(n)) {
                break ReadOutcome::Found(run.len());
            }
            if cap > 0 && run.len() >= cap {
                break ReadOutcome::Limit(run.len());
            }
            if Instant::now() > deadline {
                break ReadOutcome::TimedOut;
            }
        };

        match outcome {
            ReadOutcome::Found(_) | ReadOutcome::Limit(_) => {}
            ReadOutcome::TimedOut => self.logger.debug(format!(
                "Session::read_until: timed out after {}s with {} bytes",
                self.timeout.as_secs(),
                run.len()
            )),
            ReadOutcome::Eof => self.logger.debug(format!(
                "Session::read_until: end of stream after {} bytes",
                run.len()
            )),
            ReadOutcome::Cancelled => self.logger.notice(format!(
                "Session::read_until: cancelled after {} bytes",
                run.len()
            )),
        }

        self.read_buffer.extend_from_slice(&run);
        outcome
    }

    /// Skip output up to and including the next prompt.
    pub async fn skip_to_prompt(&mut self) -> ReadOutcome {
        let prompt = self.prompt.clone();
        self.read_until(Some(&prompt), None).await
    }

    /// Send raw data to the shell, returning how many bytes went out.
    ///
    /// A session that is not online ignores the call and returns zero.
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> ShellResult<usize> {
        if !self.is_online() {
            return Ok(0);
        }
        self.write_buffer.extend_from_slice(data.as_ref());
        self.flush().await
    }

    async fn flush(&mut self) -> ShellResult<usize> {
        let pending = std::mem::take(&mut self.write_buffer);
        let mut written = 0;

        while written < pending.len() && self.is_online() {
            match self.connector.write(&pending[written..]).await {
                Ok(n) if n > 0 => written += n,
                result => {
                    if !self.connector.is_connected() {
                        self.logger.debug("Session::write: disconnected");
                        break;
                    }
                    let reason = match result {
                        Ok(_) => "connector accepted no bytes".to_string(),
                        Err(e) => e.to_string(),
                    };
                    self.logger
                        .err(format!("Session::write: error writing to shell: {reason}"));
                    return Err(ShellError::Write(reason));
                }
            }
        }

        Ok(written)
    }

    /// Drain the output buffer.
    pub fn take_result(&mut self) -> String {
        String::from_utf8_lossy(&self.take_result_bytes()).into_owned()
    }

    pub fn take_result_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.read_buffer)
    }

    /// Output read so far, without draining it.
    pub fn pending_output(&self) -> &[u8] {
        &self.read_buffer
    }

    pub fn eol(&self) -> &str {
        &self.eol
    }

    pub fn set_eol(&mut self, eol: impl Into<String>) -> &str {
        self.eol = eol.into();
        self.logger.debug(format!(
            "Session::set_eol: end of line set to \"{}\"",
            escape_controls(&self.eol)
        ));
        &self.eol
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> &str {
        self.prompt = prompt.into();
        self.logger.debug(format!(
            "Session::set_prompt: prompt set to \"{}\"",
            escape_controls(&self.prompt)
        ));
        &self.prompt
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Zero is ignored; the timeout must stay positive.
    pub fn set_timeout(&mut self, timeout: Duration) {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn is_logged_in(&self) -> bool {
        self.connector.is_logged_in()
    }

    /// Connected and logged in, i.e. able to run commands.
    pub fn is_online(&self) -> bool {
        self.is_connected() && self.is_logged_in()
    }

    pub fn last_error(&self) -> &str {
        self.connector.last_error()
    }

    pub fn last_error_code(&self) -> Option<u32> {
        self.connector.last_error_code()
    }

    /// Token that aborts an in-flight read when cancelled.
    ///
    /// It stays cancelled until [`Session::reset_cancel`] is called.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replace a cancelled token with a fresh one.
    pub fn reset_cancel(&mut self) -> CancellationToken {
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Log out and disconnect. Failures are swallowed.
    pub async fn close(mut self) {
        self.closed = true;
        if self.connector.is_logged_in() && !self.connector.logout().await {
            self.logger.debug("Session::close: logout reported nothing to close");
        }
        if self.connector.is_connected() {
            self.connector.disconnect().await;
        }
        self.logger.debug("Session::close: released");
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if !self.closed && self.connector.is_connected() {
            self.logger
                .warning("Session dropped without close(); leaving connector cleanup to its owner");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, WriteFailure};

    fn config() -> SessionConfig {
        SessionConfig::default().with_eol("\n")
    }

    fn online(conn: MockConnector) -> Session<MockConnector> {
        Session::new(conn.logged_in(), config()).unwrap()
    }

    #[test]
    fn requires_connected_connector() {
        let result = Session::new(MockConnector::disconnected(), config());
        assert!(matches!(result, Err(ShellError::NotConnected)));
    }

    #[tokio::test]
    async fn skip_to_prompt_reads_through_prompt() {
        let mut session = online(MockConnector::new().with_input("user@host:~$ "));
        assert_eq!(session.skip_to_prompt().await, ReadOutcome::Found(13));
        assert_eq!(session.take_result(), "user@host:~$ ");
    }

    #[tokio::test]
    async fn read_until_stops_at_first_match() {
        let mut session = online(MockConnector::new().with_input("abc$ def$ "));
        let outcome = session.read_until(Some("$ "), None).await;
        assert_eq!(outcome, ReadOutcome::Found(5));
        assert_eq!(session.pending_output(), b"abc$ ");
        assert_eq!(session.connector().pending_input(), 5);
    }

    #[tokio::test]
    async fn read_until_byte_cap() {
        let mut session = online(MockConnector::new().with_input("0123456789"));
        assert_eq!(session.read_until(None, Some(4)).await, ReadOutcome::Limit(4));
        assert_eq!(session.take_result(), "0123");
    }

    #[tokio::test]
    async fn match_wins_when_it_coincides_with_cap() {
        let mut session = online(MockConnector::new().with_input("ab$ "));
        assert_eq!(
            session.read_until(Some("$ "), Some(4)).await,
            ReadOutcome::Found(4)
        );
    }

    #[tokio::test]
    async fn zero_cap_means_unbounded() {
        let mut session = online(MockConnector::new().with_input("abcdef$ "));
        assert_eq!(
            session.read_until(Some("$ "), Some(0)).await,
            ReadOutcome::Found(8)
        );
    }

    #[tokio::test]
    async fn eof_keeps_partial_output() {
        let mut session = online(MockConnector::new().with_input("partial"));
        let outcome = session.read_until(Some("$ "), None).await;
        assert_eq!(outcome, ReadOutcome::Eof);
        assert_eq!(outcome.count(), None);
        assert_eq!(session.take_result(), "partial");
    }

    #[tokio::test]
    async fn empty_search_behaves_like_none() {
        let mut session = online(MockConnector::new().with_input("xyz"));
        assert_eq!(session.read_until(Some(""), Some(2)).await, ReadOutcome::Limit(2));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_partial_output() {
        let mut session = online(MockConnector::new().with_input("no prompt").idle_when_drained());
        let outcome = session.read_until(Some("$ "), None).await;
        assert_eq!(outcome, ReadOutcome::TimedOut);
        assert_eq!(session.take_result(), "no prompt");
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_read_runs_until_timeout() {
        let mut session = online(MockConnector::new().with_input("abc").idle_when_drained());
        let started = Instant::now();
        assert_eq!(session.read_until(None, None).await, ReadOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(session.pending_output(), b"abc");
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timeout_is_honoured() {
        let conn = MockConnector::new().logged_in().idle_when_drained();
        let mut session = Session::new(conn, config().with_timeout_secs(2)).unwrap();
        let started = Instant::now();
        assert_eq!(session.skip_to_prompt().await, ReadOutcome::TimedOut);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_read_immediately() {
        let mut session = online(MockConnector::new().with_input("half").idle_when_drained());
        let token = session.cancel_token();
        token.cancel();
        assert_eq!(session.skip_to_prompt().await, ReadOutcome::Cancelled);

        let fresh = session.reset_cancel();
        assert!(!fresh.is_cancelled());
        assert_eq!(session.take_result(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_from_another_task() {
        let mut session = online(MockConnector::new().with_input("half").idle_when_drained());
        let token = session.cancel_token();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        assert_eq!(session.skip_to_prompt().await, ReadOutcome::Cancelled);
        assert_eq!(session.take_result(), "half");
    }

    #[tokio::test]
    async fn take_result_drains() {
        let mut session = online(MockConnector::new().with_input("one$ two$ "));
        session.skip_to_prompt().await;
        session.skip_to_prompt().await;
        assert_eq!(session.take_result(), "one$ two$ ");
        assert_eq!(session.take_result(), "");
    }

    #[tokio::test]
    async fn execute_writes_command_and_reads_to_prompt() {
        let conn = MockConnector::new().on_write("whoami\n", "whoami\nuser\n$ ");
        let mut session = online(conn);

        let output = session.execute("whoami").await.unwrap();
        assert_eq!(session.connector().written(), b"whoami\n");

        let cmd = output.find("whoami").unwrap();
        let user = output.find("user").unwrap();
        let prompt = output.rfind("$ ").unwrap();
        assert!(cmd < user && user < prompt);
        assert!(output.ends_with("$ "));
        assert_eq!(session.take_result(), "");
    }

    #[tokio::test]
    async fn execute_uses_configured_eol() {
        let conn = MockConnector::new().on_write("ls\r", "ls\r\nfile\r\n# ");
        let mut session = online(conn);
        session.set_eol("\r");
        session.set_prompt("# ");
        let output = session.execute("ls").await.unwrap();
        assert!(output.ends_with("# "));
        assert_eq!(session.connector().written_str(), "ls\r");
    }

    #[tokio::test]
    async fn write_offline_is_a_no_op() {
        let mut session = Session::new(MockConnector::new(), config()).unwrap();
        assert!(!session.is_online());
        assert_eq!(session.write("echo hi\n").await.unwrap(), 0);
        assert!(session.connector().written().is_empty());
    }

    #[tokio::test]
    async fn write_loops_over_partial_writes() {
        let mut session = online(MockConnector::new().with_write_chunk(3));
        assert_eq!(session.write("abcdefgh").await.unwrap(), 8);
        assert_eq!(session.connector().written(), b"abcdefgh");
    }

    #[tokio::test]
    async fn link_loss_mid_write_is_a_clean_stop() {
        let conn = MockConnector::new().with_write_chunk(2).fail_writes_after(
            1,
            WriteFailure::LinkLost {
                code: Some(11),
                message: "connection closed by remote host".into(),
            },
        );
        let mut session = online(conn);
        assert_eq!(session.write("abcdef").await.unwrap(), 2);
        assert!(!session.is_connected());
        assert_eq!(session.last_error(), "connection closed by remote host");
        assert_eq!(session.last_error_code(), Some(11));
    }

    #[tokio::test]
    async fn io_fault_with_live_link_is_an_error() {
        let conn = MockConnector::new()
            .fail_writes_after(0, WriteFailure::Fault("broken pipe".into()));
        let mut session = online(conn);
        let err = session.write("abc").await.unwrap_err();
        assert!(matches!(err, ShellError::Write(_)));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn execute_surfaces_write_errors() {
        let conn = MockConnector::new()
            .fail_writes_after(0, WriteFailure::Fault("broken pipe".into()));
        let mut session = online(conn);
        assert!(matches!(session.execute("ls").await, Err(ShellError::Write(_))));
    }

    #[tokio::test]
    async fn login_failure_propagates() {
        let conn = MockConnector::new().with_credentials("alice", "secret");
        let mut session = Session::new(conn, config()).unwrap();
        assert!(matches!(
            session.login("alice", "nope").await,
            Err(ShellError::Authentication(_))
        ));
        assert!(session.login("alice", "secret").await.unwrap());
        assert!(session.is_online());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let mut session = online(MockConnector::new());
        assert!(session.logout().await);
        assert!(!session.logout().await);
        assert!(session.is_connected());
        assert!(!session.is_online());
    }

    #[tokio::test]
    async fn online_is_connected_and_logged_in() {
        let mut session = Session::new(MockConnector::new(), config()).unwrap();
        let check = |s: &Session<MockConnector>| {
            assert_eq!(s.is_online(), s.is_connected() && s.is_logged_in());
        };

        check(&session);
        session.login("u", "p").await.unwrap();
        check(&session);
        assert!(session.is_online());
        session.logout().await;
        check(&session);
        session.login("u", "p").await.unwrap();
        session.connector_mut().drop_link(None, "gone");
        check(&session);
        assert!(!session.is_online());
    }

    #[test]
    fn eol_and_prompt_accessors() {
        let mut session = online(MockConnector::new());
        assert_eq!(session.set_prompt("--->"), "--->");
        assert_eq!(session.prompt(), "--->");
        assert_eq!(session.set_eol("\n\r"), "\n\r");
        assert_eq!(session.eol(), "\n\r");
    }

    #[test]
    fn zero_timeout_is_ignored() {
        let mut session = online(MockConnector::new());
        session.set_timeout(Duration::ZERO);
        assert_eq!(session.timeout(), Duration::from_secs(5));
        session.set_timeout(Duration::from_secs(9));
        assert_eq!(session.timeout(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn close_logs_out_and_disconnects() {
        let mut conn = MockConnector::new().logged_in();
        let session = Session::new(&mut conn, config()).unwrap();
        session.close().await;
        assert!(!conn.is_logged_in());
        assert!(!conn.is_connected());
        assert_eq!(conn.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn dropping_unclosed_session_leaves_connector_alone() {
        let mut conn = MockConnector::new().logged_in();
        {
            let _session = Session::new(&mut conn, config()).unwrap();
        }
        assert!(conn.is_connected());
        assert!(conn.is_logged_in());
        assert_eq!(conn.disconnect_count(), 0);
    }

    #[tokio::test]
    async fn close_tolerates_dead_link() {
        let mut session = online(MockConnector::new());
        session.connector_mut().drop_link(Some(2), "reset");
        session.close().await;
    }

    /// Hands out bytes slowly: every read waits on the timer, or the read of
    /// the final scripted byte stalls the thread.
    struct SlowConnector {
        input: std::collections::VecDeque<u8>,
        repeat: Option<u8>,
        per_byte: Option<Duration>,
        stall_before_last: Option<Duration>,
    }

    impl SlowConnector {
        /// Emits `byte` forever, one per `interval`.
        fn trickle(byte: u8, interval: Duration) -> Self {
            Self {
                input: Default::default(),
                repeat: Some(byte),
                per_byte: Some(interval),
                stall_before_last: None,
            }
        }

        /// Emits `data`, blocking for `stall` before the last byte.
        fn stalling(data: &str, stall: Duration) -> Self {
            Self {
                input: data.bytes().collect(),
                repeat: None,
                per_byte: None,
                stall_before_last: Some(stall),
            }
        }
    }

    impl Connector for SlowConnector {
        async fn login(&mut self, _: &str, _: &str) -> ShellResult<bool> {
            Ok(true)
        }

        async fn logout(&mut self) -> bool {
            false
        }

        async fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }

        fn is_logged_in(&self) -> bool {
            true
        }

        async fn read(&mut self) -> Option<u8> {
            if let Some(interval) = self.per_byte {
                time::sleep(interval).await;
            }
            if let Some(byte) = self.repeat {
                return Some(byte);
            }
            if self.input.len() == 1 {
                if let Some(stall) = self.stall_before_last {
                    std::thread::sleep(stall);
                }
            }
            self.input.pop_front()
        }

        async fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            Ok(data.len())
        }

        fn last_error(&self) -> &str {
            ""
        }

        fn last_error_code(&self) -> Option<u32> {
            None
        }
    }

    fn one_second() -> SessionConfig {
        config().with_timeout_secs(1)
    }

    #[tokio::test(start_paused = true)]
    async fn steady_trickle_still_times_out() {
        let conn = SlowConnector::trickle(b'x', Duration::from_millis(100));
        let mut session = Session::new(conn, one_second()).unwrap();
        assert_eq!(session.read_until(Some("$ "), None).await, ReadOutcome::TimedOut);
        let kept = session.take_result();
        assert_eq!(kept, "x".repeat(10));
    }

    #[tokio::test]
    async fn late_byte_past_deadline_times_out_and_is_kept() {
        let conn = SlowConnector::stalling("ab", Duration::from_millis(1300));
        let mut session = Session::new(conn, one_second()).unwrap();
        assert_eq!(session.read_until(Some("$ "), None).await, ReadOutcome::TimedOut);
        assert_eq!(session.take_result(), "ab");
    }

    #[tokio::test]
    async fn match_beats_timeout_seen_after_same_byte() {
        let conn = SlowConnector::stalling("$ ", Duration::from_millis(1300));
        let mut session = Session::new(conn, one_second()).unwrap();
        assert_eq!(session.skip_to_prompt().await, ReadOutcome::Found(2));
        assert_eq!(session.take_result(), "$ ");
    }

    #[tokio::test]
    async fn cap_beats_timeout_seen_after_same_byte() {
        let conn = SlowConnector::stalling("ab", Duration::from_millis(1300));
        let mut session = Session::new(conn, one_second()).unwrap();
        assert_eq!(session.read_until(None, Some(2)).await, ReadOutcome::Limit(2));
        assert_eq!(session.take_result(), "ab");
    }

    #[test]
    fn outcome_counts() {
        assert_eq!(ReadOutcome::Found(3).count(), Some(3));
        assert_eq!(ReadOutcome::Limit(7).count(), Some(7));
        assert!(!ReadOutcome::TimedOut.is_success());
        assert!(!ReadOutcome::Eof.is_success());
        assert!(!ReadOutcome::Cancelled.is_success());
    }
}

//! SSH transport connector.
//!
//! Wraps a russh client handle and one interactive shell channel. Shell
//! output arrives as channel messages and is queued so the session can
//! consume it a byte at a time.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::time;

use promptline_core::{Connector, Logger, ShellError, ShellResult};

use crate::host_key::{ClientHandler, HostKeyPolicy};

/// Largest slice handed to the channel per write call.
pub const WRITE_CHUNK: usize = 4096;

pub const DEFAULT_TERM: &str = "vt102";
pub const DEFAULT_COLS: u32 = 80;
pub const DEFAULT_ROWS: u32 = 40;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for [`SshConnector::connect`].
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Terminal type requested with the PTY.
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    pub connect_timeout: Duration,
    pub host_keys: HostKeyPolicy,
    pub logger: Logger,
}

impl SshOptions {
    pub fn new(host_keys: HostKeyPolicy) -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            host_keys,
            logger: Logger::silent(),
        }
    }

    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    pub fn with_size(mut self, cols: u32, rows: u32) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}

/// A [`Connector`] speaking SSH with password authentication.
pub struct SshConnector {
    handle: Handle<ClientHandler>,
    channel: Option<Channel<client::Msg>>,
    pending: VecDeque<u8>,
    host: String,
    port: u16,
    username: String,
    term: String,
    cols: u32,
    rows: u32,
    connected: bool,
    last_error: String,
    last_error_code: Option<u32>,
    logger: Logger,
}

impl SshConnector {
    /// Open the transport and verify the server's host key.
    pub async fn connect(host: &str, port: u16, options: SshOptions) -> ShellResult<Self> {
        let logger = options.logger.clone();
        let rejection = Arc::new(Mutex::new(None));
        let handler = ClientHandler::new(
            format!("{host}:{port}"),
            options.host_keys.clone(),
            logger.clone(),
            rejection.clone(),
        );
        let config = Arc::new(client::Config::default());

        let attempt = time::timeout(
            options.connect_timeout,
            client::connect(config, (host, port), handler),
        )
        .await;

        let handle = match attempt {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let rejected = rejection
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
                if let Some(reason) = rejected {
                    return Err(ShellError::HostKey(reason));
                }
                let message = format!("unable to establish connection to {host}:{port}: {e}");
                logger.err(&message);
                return Err(ShellError::Connection(message));
            }
            Err(_) => {
                let message = format!(
                    "unable to establish connection to {host}:{port}: timed out after {}s",
                    options.connect_timeout.as_secs()
                );
                logger.err(&message);
                return Err(ShellError::Connection(message));
            }
        };

        logger.debug(format!("SSH connection to {host}:{port} established"));

        Ok(Self {
            handle,
            channel: None,
            pending: VecDeque::new(),
            host: host.to_string(),
            port,
            username: String::new(),
            term: options.term,
            cols: options.cols,
            rows: options.rows,
            connected: true,
            last_error: String::new(),
            last_error_code: None,
            logger,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The user of the current (or last) login.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    fn shell_ended(&mut self, reason: &str) {
        self.channel = None;
        if self.last_error.is_empty() {
            self.last_error = reason.to_string();
        }
        if self.handle.is_closed() {
            self.mark_disconnected(reason);
        } else {
            self.logger
                .debug(format!("shell on {} ended: {reason}", self.target()));
        }
    }

    fn mark_disconnected(&mut self, reason: &str) {
        self.connected = false;
        self.channel = None;
        self.last_error = reason.to_string();
        self.logger
            .debug(format!("SSH connection {} closed: {reason}", self.target()));
    }

    async fn open_shell(&self) -> Result<Channel<client::Msg>, russh::Error> {
        let channel = self.handle.channel_open_session().await?;
        channel
            .request_pty(false, &self.term, self.cols, self.rows, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        Ok(channel)
    }
}

impl Connector for SshConnector {
    async fn login(&mut self, username: &str, password: &str) -> ShellResult<bool> {
        if !self.is_connected() {
            return Err(ShellError::NotConnected);
        }

        let auth = match self.handle.authenticate_password(username, password).await {
            Ok(auth) => auth,
            Err(e) => {
                let message = format!("unable to authenticate user {username}: {e}");
                self.logger.err(&message);
                return Err(ShellError::Authentication(message));
            }
        };
        if !auth.success() {
            let message = format!("unable to authenticate user {username}");
            self.logger.err(&message);
            return Err(ShellError::Authentication(message));
        }
        self.username = username.to_string();

        let channel = self.open_shell().await.map_err(|e| {
            let message = format!("unable to establish shell for {username}: {e}");
            self.logger.err(&message);
            ShellError::Other(message)
        })?;

        self.channel = Some(channel);
        self.pending.clear();
        self.last_error.clear();
        self.last_error_code = None;
        self.logger.debug(format!("{} logged in", self.target()));
        Ok(true)
    }

    async fn logout(&mut self) -> bool {
        let Some(channel) = self.channel.take() else {
            return false;
        };
        let _ = channel.eof().await;
        let _ = channel.close().await;
        self.pending.clear();
        self.logger.debug(format!("{} logged out", self.target()));
        true
    }

    async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        if let Some(channel) = self.channel.take() {
            let _ = channel.close().await;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            self.logger
                .debug(format!("disconnect from {}:{}: {e}", self.host, self.port));
        }
        self.connected = false;
        self.pending.clear();
        self.logger
            .debug(format!("disconnected from {}:{}", self.host, self.port));
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.handle.is_closed()
    }

    fn is_logged_in(&self) -> bool {
        self.channel.is_some()
    }

    async fn read(&mut self) -> Option<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Some(byte);
            }
            if self.connected && self.handle.is_closed() {
                self.mark_disconnected("connection closed by remote host");
                return None;
            }
            let channel = self.channel.as_mut()?;

            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => self.pending.extend(data.iter().copied()),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    self.pending.extend(data.iter().copied())
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.last_error = format!("remote shell exited with status {exit_status}");
                    self.last_error_code = Some(exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    self.shell_ended("shell channel closed");
                    return None;
                }
                Some(_) => {}
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(channel) = self.channel.as_ref() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no interactive shell",
            ));
        };

        let n = data.len().min(WRITE_CHUNK);
        match channel.data(&data[..n]).await {
            Ok(()) => Ok(n),
            Err(e) => {
                let message = format!("write to {} failed: {e}", self.target());
                if self.handle.is_closed() {
                    self.mark_disconnected(&message);
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, message))
                } else {
                    self.last_error = message.clone();
                    Err(io::Error::other(message))
                }
            }
        }
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn last_error_code(&self) -> Option<u32> {
        self.last_error_code
    }
}

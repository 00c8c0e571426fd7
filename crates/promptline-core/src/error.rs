use thiserror::Error;

/// Structural failures of a shell session.
///
/// Stream-level conditions (read timeout, EOF before the prompt, cancellation)
/// are not errors; they are reported through
/// [`ReadOutcome`](crate::session::ReadOutcome).
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("connector is not connected")]
    NotConnected,

    #[error("host key rejected: {0}")]
    HostKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type ShellResult<T> = Result<T, ShellError>;

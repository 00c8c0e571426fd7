//! Abstract transport connector for shell sessions.
//!
//! A connector owns the network handle (an SSH connection, a telnet socket,
//! an in-memory script) and exposes byte-level I/O plus the
//! `Disconnected -> Connected -> LoggedIn` state machine. [`Session`] works
//! with any conforming implementation.
//!
//! [`Session`]: crate::session::Session

use std::io;

use crate::error::ShellResult;

/// Capability interface every transport variant implements.
///
/// Construction (`connect`) is transport specific and lives on the concrete
/// type; a connector handed to a session is expected to be connected already.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Authenticate and open an interactive shell.
    ///
    /// Rejected credentials are reported as
    /// [`ShellError::Authentication`](crate::ShellError::Authentication).
    async fn login(&mut self, username: &str, password: &str) -> ShellResult<bool>;

    /// Close the interactive shell. Returns `false` if not logged in.
    async fn logout(&mut self) -> bool;

    /// Tear down the transport. Calling it twice is harmless.
    async fn disconnect(&mut self);

    /// Whether the transport link is up.
    fn is_connected(&self) -> bool;

    /// Whether an interactive shell is open.
    fn is_logged_in(&self) -> bool;

    /// Read a single byte from the shell output.
    ///
    /// Waits until a byte is available. `None` is the end-of-stream marker:
    /// the shell closed, the link dropped, or no shell is open.
    async fn read(&mut self) -> Option<u8>;

    /// Hand some prefix of `data` to the transport.
    ///
    /// Returns how many bytes were accepted; callers loop until everything
    /// is accounted for.
    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Last recorded error message, empty when none.
    fn last_error(&self) -> &str;

    /// Last recorded error code, if the transport reported one.
    fn last_error_code(&self) -> Option<u32>;
}

impl<C: Connector> Connector for &mut C {
    async fn login(&mut self, username: &str, password: &str) -> ShellResult<bool> {
        (**self).login(username, password).await
    }

    async fn logout(&mut self) -> bool {
        (**self).logout().await
    }

    async fn disconnect(&mut self) {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn is_logged_in(&self) -> bool {
        (**self).is_logged_in()
    }

    async fn read(&mut self) -> Option<u8> {
        (**self).read().await
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data).await
    }

    fn last_error(&self) -> &str {
        (**self).last_error()
    }

    fn last_error_code(&self) -> Option<u32> {
        (**self).last_error_code()
    }
}

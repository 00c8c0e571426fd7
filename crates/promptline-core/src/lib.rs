//! promptline-core: prompt-driven interactive shell sessions.
//!
//! A [`Session`] drives a remote command interpreter through any
//! [`Connector`]: it writes a command, reads output byte by byte until the
//! prompt comes back, and keeps everything read in a buffer the caller
//! drains explicitly.
//!
//! # Quick Start
//!
//! ```no_run
//! use promptline_core::{Connector, Session, SessionConfig, ShellResult};
//!
//! # async fn example<C: Connector>(connector: C) -> ShellResult<()> {
//! let mut session = Session::new(connector, SessionConfig::default())?;
//! session.login("alice", "secret").await?;
//! session.skip_to_prompt().await;
//!
//! let output = session.execute("uname -a").await?;
//! println!("{output}");
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod log;
pub mod mock;
pub mod session;

pub use config::SessionConfig;
pub use connector::Connector;
pub use error::{ShellError, ShellResult};
pub use log::{LogSink, Logger, Severity, TracingSink};
pub use session::{ReadOutcome, Session};

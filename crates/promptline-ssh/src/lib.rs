//! SSH transport for promptline sessions.
//!
//! [`SshConnector`] implements [`promptline_core::Connector`] on top of
//! `russh`: password login, a PTY-backed interactive shell, and host key
//! verification against a `known_hosts` file.

pub mod connector;
pub mod host_key;
pub mod known_hosts;

pub use connector::{SshConnector, SshOptions};
pub use host_key::{fingerprint, HostKeyPolicy, HostKeyPrompt, HostKeyQuery};
pub use known_hosts::{HostStatus, KnownHosts};

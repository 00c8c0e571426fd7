//! Server host key verification.
//!
//! A fingerprint is the hex SHA-256 of the key's OpenSSH wire encoding. The
//! [`HostKeyPolicy`] decides what happens to keys that are unknown or that
//! changed since they were recorded.

use std::fmt;
use std::sync::{Arc, Mutex};

use russh::client;
use russh::keys::PublicKey;
use sha2::{Digest, Sha256};

use promptline_core::{Logger, ShellError, ShellResult};

use crate::known_hosts::{HostStatus, KnownHosts};

/// Hex-encoded SHA-256 of an encoded public key.
pub fn fingerprint(encoded_key: &[u8]) -> String {
    hex::encode(Sha256::digest(encoded_key))
}

/// What an interactive callback is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyQuery {
    /// `host:port`.
    pub host: String,
    pub fingerprint: String,
    /// `Unknown` or `Changed`; known keys never reach the callback.
    pub status: HostStatus,
}

/// Returns `true` to trust the key. Runs on a blocking thread.
pub type HostKeyPrompt = Arc<dyn Fn(&HostKeyQuery) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum HostKeyPolicy {
    /// Trust every key. Only for tests and throwaway hosts.
    AcceptAny,
    /// Record unknown keys, reject changed ones.
    Tofu(KnownHosts),
    /// Reject anything not already recorded.
    Strict(KnownHosts),
    /// Ask the callback about unknown and changed keys; record accepted ones.
    Ask(KnownHosts, HostKeyPrompt),
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcceptAny => f.write_str("AcceptAny"),
            Self::Tofu(kh) => f.debug_tuple("Tofu").field(kh).finish(),
            Self::Strict(kh) => f.debug_tuple("Strict").field(kh).finish(),
            Self::Ask(kh, _) => f.debug_tuple("Ask").field(kh).finish(),
        }
    }
}

/// Outcome of checking a key against the policy, before any prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Accept,
    Record,
    Reject(String),
    Ask(HostStatus),
}

impl HostKeyPolicy {
    pub(crate) fn decide(&self, host: &str, fingerprint: &str) -> ShellResult<Decision> {
        let known_hosts = match self {
            Self::AcceptAny => return Ok(Decision::Accept),
            Self::Tofu(kh) | Self::Strict(kh) | Self::Ask(kh, _) => kh,
        };

        let decision = match (known_hosts.verify_host(host, fingerprint)?, self) {
            (HostStatus::Known, _) => Decision::Accept,
            (status, Self::Ask(..)) => Decision::Ask(status),
            (HostStatus::Unknown, Self::Tofu(_)) => Decision::Record,
            (HostStatus::Unknown, _) => {
                Decision::Reject(format!("{host} is not a known host"))
            }
            (HostStatus::Changed { expected }, _) => Decision::Reject(format!(
                "host key for {host} changed (expected {expected}, got {fingerprint})"
            )),
        };
        Ok(decision)
    }

    /// Check a fingerprint, prompting and recording as the policy requires.
    pub async fn verify(&self, host: &str, fingerprint: &str) -> ShellResult<()> {
        let trusted = match self.decide(host, fingerprint)? {
            Decision::Accept => return Ok(()),
            Decision::Reject(reason) => return Err(ShellError::HostKey(reason)),
            Decision::Record => true,
            Decision::Ask(status) => {
                let Self::Ask(_, prompt) = self else {
                    return Err(ShellError::HostKey(format!("no prompt available for {host}")));
                };
                let prompt = prompt.clone();
                let query = HostKeyQuery {
                    host: host.to_string(),
                    fingerprint: fingerprint.to_string(),
                    status,
                };
                tokio::task::spawn_blocking(move || prompt(&query))
                    .await
                    .map_err(|e| ShellError::Other(format!("host key prompt failed: {e}")))?
            }
        };

        if !trusted {
            return Err(ShellError::HostKey(format!(
                "host key for {host} was not accepted"
            )));
        }

        match self {
            Self::Tofu(kh) | Self::Ask(kh, _) => kh.add_host(host, fingerprint),
            Self::AcceptAny | Self::Strict(_) => Ok(()),
        }
    }
}

/// russh client callbacks: host key checking only.
pub(crate) struct ClientHandler {
    host: String,
    policy: HostKeyPolicy,
    logger: Logger,
    rejection: Arc<Mutex<Option<String>>>,
}

impl ClientHandler {
    pub(crate) fn new(
        host: String,
        policy: HostKeyPolicy,
        logger: Logger,
        rejection: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            host,
            policy,
            logger,
            rejection,
        }
    }

    fn reject(&self, reason: String) {
        self.logger.err(format!("host key check: {reason}"));
        *self.rejection.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reason);
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let encoded = match server_public_key.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reject(format!("cannot encode host key of {}: {e}", self.host));
                return Ok(false);
            }
        };
        let fp = fingerprint(&encoded);

        match self.policy.verify(&self.host, &fp).await {
            Ok(()) => {
                self.logger
                    .debug(format!("host key check: {} accepted ({fp})", self.host));
                Ok(true)
            }
            Err(e) => {
                self.reject(e.to_string());
                Ok(false)
            }
        }
    }
}

//! Host key policy for the CLI.
//!
//! Builds a [`HostKeyPolicy`] from the configured mode. In `ask` mode the
//! user confirms unknown keys and changed keys via dialoguer.

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::sync::Arc;
use tracing::warn;

use promptline_ssh::{HostKeyPolicy, HostKeyQuery, HostStatus, KnownHosts};

use crate::config::HostKeyMode;

pub fn known_hosts() -> Result<KnownHosts> {
    KnownHosts::default_location().context("failed to initialize known_hosts")
}

pub fn policy(mode: HostKeyMode) -> Result<HostKeyPolicy> {
    let policy = match mode {
        HostKeyMode::AcceptAny => HostKeyPolicy::AcceptAny,
        HostKeyMode::Tofu => HostKeyPolicy::Tofu(known_hosts()?),
        HostKeyMode::Strict => HostKeyPolicy::Strict(known_hosts()?),
        HostKeyMode::Ask => HostKeyPolicy::Ask(known_hosts()?, Arc::new(confirm)),
    };
    Ok(policy)
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(16)]
}

/// Ask the user whether to trust a server key.
fn confirm(query: &HostKeyQuery) -> bool {
    let host = &query.host;
    let prompt = match &query.status {
        HostStatus::Changed { expected } => {
            eprintln!("@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@");
            eprintln!("@    WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!    @");
            eprintln!("@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@");
            eprintln!("The server key fingerprint for '{host}' has changed.");
            eprintln!("  Previous: {}", short(expected));
            eprintln!("  Current:  {}", short(&query.fingerprint));
            warn!(
                host = %host,
                old_fp = %short(expected),
                new_fp = %short(&query.fingerprint),
                "host key has changed"
            );
            "Do you want to update the known host and continue?"
        }
        HostStatus::Unknown | HostStatus::Known => {
            eprintln!("The authenticity of host '{host}' cannot be established.");
            eprintln!("Server key fingerprint is {}.", short(&query.fingerprint));
            "Are you sure you want to continue connecting?"
        }
    };

    let accepted = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false);

    if accepted {
        eprintln!("Warning: Permanently added '{host}' to the list of known hosts.");
    }
    accepted
}

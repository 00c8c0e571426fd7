//! `promptline known-hosts`: inspect and edit the known hosts file.

use anyhow::Result;

use crate::known_hosts::known_hosts;

/// Print every recorded `host:port` and its fingerprint.
pub fn run_list() -> Result<()> {
    let known_hosts = known_hosts()?;
    let entries = known_hosts.list()?;

    if entries.is_empty() {
        eprintln!("No known hosts in {}", known_hosts.path().display());
        return Ok(());
    }
    for (host, fingerprint) in entries {
        println!("{host} {fingerprint}");
    }
    Ok(())
}

pub fn run_remove(host: &str) -> Result<()> {
    let known_hosts = known_hosts()?;
    if known_hosts.remove_host(host)? {
        eprintln!("Removed '{host}' from {}", known_hosts.path().display());
        Ok(())
    } else {
        anyhow::bail!("'{host}' is not in {}", known_hosts.path().display())
    }
}

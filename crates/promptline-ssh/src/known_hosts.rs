//! Recorded server fingerprints, keyed by `host:port`.
//!
//! The file lives at `~/.promptline/known_hosts` and holds one
//! `host:port fingerprint` pair per line. Blank lines and `#` comments are
//! ignored; if a host appears twice the last line wins. Rewrites go through
//! a sibling temp file so a crash never leaves a truncated file behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use promptline_core::{ShellError, ShellResult};

/// Result of looking up a host's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    /// Stored and matching.
    Known,
    /// Never seen before.
    Unknown,
    /// Stored with a different fingerprint.
    Changed {
        /// The previously stored fingerprint.
        expected: String,
    },
}

type Entries = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.promptline/known_hosts`.
    pub fn default_location() -> ShellResult<Self> {
        dirs::home_dir()
            .map(|home| Self::new(home.join(".promptline").join("known_hosts")))
            .ok_or_else(|| ShellError::Other("cannot determine home directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verify_host(&self, host: &str, fingerprint: &str) -> ShellResult<HostStatus> {
        Ok(match self.read()?.remove(host) {
            None => HostStatus::Unknown,
            Some(stored) if stored == fingerprint => HostStatus::Known,
            Some(expected) => HostStatus::Changed { expected },
        })
    }

    /// Record `fingerprint` for `host`, replacing any earlier one.
    pub fn add_host(&self, host: &str, fingerprint: &str) -> ShellResult<()> {
        let mut entries = self.read()?;
        entries.insert(host.to_string(), fingerprint.to_string());
        self.write(&entries)
    }

    /// Returns whether an entry was removed.
    pub fn remove_host(&self, host: &str) -> ShellResult<bool> {
        let mut entries = self.read()?;
        if entries.remove(host).is_none() {
            return Ok(false);
        }
        self.write(&entries)?;
        Ok(true)
    }

    /// All entries, ordered by host.
    pub fn list(&self) -> ShellResult<Vec<(String, String)>> {
        Ok(self.read()?.into_iter().collect())
    }

    fn read(&self) -> ShellResult<Entries> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, entries: &Entries) -> ShellResult<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }

        let staging = self.path.with_extension("tmp");
        {
            let mut file = private_file(&staging)?;
            for (host, fingerprint) in entries {
                writeln!(file, "{host} {fingerprint}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

fn parse(content: &str) -> Entries {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?.to_string(), fields.next()?.to_string()))
        })
        .collect()
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

//! Client configuration at `~/.promptline/config.toml`.
//!
//! Provides default host, port, user and host key handling plus a
//! `[session]` table. CLI flags always override config file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use promptline_core::SessionConfig;

/// Environment variable consulted for the login password.
pub const DEFAULT_PASSWORD_ENV: &str = "PROMPTLINE_PASSWORD";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,

    /// Prompt, end-of-line and timeout for sessions.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Default remote host (empty = none).
    #[serde(default)]
    pub host: String,

    /// Default SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default login user (empty = local user).
    #[serde(default)]
    pub user: String,

    /// How unknown or changed server keys are handled.
    #[serde(default)]
    pub host_keys: HostKeyMode,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: String::new(),
            host_keys: HostKeyMode::default(),
        }
    }
}

fn default_port() -> u16 {
    22
}

/// Host key verification mode, as named on the command line and in the
/// config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyMode {
    /// Prompt for unknown or changed keys.
    #[default]
    Ask,
    /// Record unknown keys, refuse changed ones.
    Tofu,
    /// Refuse anything not in known_hosts.
    Strict,
    /// Accept every key.
    AcceptAny,
}

impl Config {
    /// `~/.promptline/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".promptline").join("config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Effective connection settings after flags are applied over the file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub default_host: String,
    pub default_user: String,
    pub host_keys: HostKeyMode,
    pub password_env: String,
    pub session: SessionConfig,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub prompt: Option<String>,
    pub timeout_secs: Option<u64>,
    pub eol: Option<String>,
    pub host_keys: Option<HostKeyMode>,
    pub password_env: Option<String>,
}

impl Settings {
    pub fn resolve(config: Config, overrides: Overrides) -> Self {
        let mut session = config.session;
        if let Some(prompt) = overrides.prompt {
            session = session.with_prompt(prompt);
        }
        if let Some(eol) = overrides.eol {
            session = session.with_eol(parse_eol(&eol));
        }
        if let Some(secs) = overrides.timeout_secs {
            session = session.with_timeout_secs(secs);
        }

        Self {
            port: overrides.port.unwrap_or(config.default.port),
            default_host: config.default.host,
            default_user: config.default.user,
            host_keys: overrides.host_keys.unwrap_or(config.default.host_keys),
            password_env: overrides
                .password_env
                .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string()),
            session,
        }
    }
}

/// Map `lf`, `crlf` and `cr` to their sequences; anything else is used
/// verbatim.
pub fn parse_eol(value: &str) -> String {
    match value.to_ascii_lowercase().as_str() {
        "lf" => "\n".to_string(),
        "crlf" => "\r\n".to_string(),
        "cr" => "\r".to_string(),
        _ => value.to_string(),
    }
}

/// Parse a `[user@]host` string into `(user, host)`.
///
/// Without a user part, `default_user` is used, then the local username
/// (or "root").
pub fn parse_target(target: &str, default_user: &str) -> Result<(String, String)> {
    if let Some((user, host)) = target.split_once('@') {
        if user.is_empty() {
            anyhow::bail!("empty username in target '{target}'");
        }
        if host.is_empty() {
            anyhow::bail!("empty host in target '{target}'");
        }
        Ok((user.to_string(), host.to_string()))
    } else {
        if target.is_empty() {
            anyhow::bail!("empty host");
        }
        let user = if default_user.is_empty() {
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "root".into())
        } else {
            default_user.to_string()
        };
        Ok((user, target.to_string()))
    }
}

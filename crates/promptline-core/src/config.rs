//! Session settings: prompt, end-of-line and read timeout.
//!
//! Every field has a default so a partial `[session]` table (or none at all)
//! deserializes cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default command prompt of a POSIX shell.
pub const DEFAULT_PROMPT: &str = "$ ";

/// Default read timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// End-of-line sequence of the local platform.
#[cfg(windows)]
pub const PLATFORM_EOL: &str = "\r\n";
#[cfg(not(windows))]
pub const PLATFORM_EOL: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prompt that marks the end of a command's output.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Appended to every executed command.
    #[serde(default = "default_eol")]
    pub eol: String,

    /// Read timeout in seconds. Zero selects the default.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            eol: default_eol(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_eol() -> String {
    PLATFORM_EOL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SessionConfig {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_eol(mut self, eol: impl Into<String>) -> Self {
        self.eol = eol.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Effective read timeout; never zero.
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs > 0 {
            Duration::from_secs(self.timeout_secs)
        } else {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.prompt, "$ ");
        assert_eq!(cfg.eol, PLATFORM_EOL);
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let cfg = SessionConfig::default().with_timeout_secs(0);
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn builder_overrides() {
        let cfg = SessionConfig::default()
            .with_prompt("# ")
            .with_eol("\r")
            .with_timeout_secs(30);
        assert_eq!(cfg.prompt, "# ");
        assert_eq!(cfg.eol, "\r");
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_document_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{ "prompt": "> " }"#).unwrap();
        assert_eq!(cfg.prompt, "> ");
        assert_eq!(cfg.eol, PLATFORM_EOL);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}

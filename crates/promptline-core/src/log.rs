//! Optional leveled logging collaborator.
//!
//! Sessions and connectors log through a [`Logger`]. A logger without a sink
//! swallows every message, so call sites never check for one. The stock sink,
//! [`TracingSink`], forwards to `tracing`.

use std::fmt;
use std::sync::Arc;

/// Syslog-style severities, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emerg",
            Self::Alert => "alert",
            Self::Critical => "crit",
            Self::Error => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for log messages.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Forwards messages to `tracing` under the `promptline` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        let severity_name = severity.as_str();
        match severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                tracing::error!(target: "promptline", severity = severity_name, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(target: "promptline", severity = severity_name, "{message}")
            }
            Severity::Notice | Severity::Info => {
                tracing::info!(target: "promptline", severity = severity_name, "{message}")
            }
            Severity::Debug => {
                tracing::debug!(target: "promptline", severity = severity_name, "{message}")
            }
        }
    }
}

/// Cheap-to-clone handle around an optional [`LogSink`].
#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<Arc<dyn LogSink>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A logger that drops everything.
    pub fn silent() -> Self {
        Self { sink: None }
    }

    /// A logger backed by [`TracingSink`].
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn log(&self, severity: Severity, message: impl AsRef<str>) {
        if let Some(sink) = &self.sink {
            sink.log(severity, message.as_ref());
        }
    }

    pub fn emerg(&self, message: impl AsRef<str>) {
        self.log(Severity::Emergency, message)
    }

    pub fn alert(&self, message: impl AsRef<str>) {
        self.log(Severity::Alert, message)
    }

    pub fn crit(&self, message: impl AsRef<str>) {
        self.log(Severity::Critical, message)
    }

    pub fn err(&self, message: impl AsRef<str>) {
        self.log(Severity::Error, message)
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Severity::Warning, message)
    }

    pub fn notice(&self, message: impl AsRef<str>) {
        self.log(Severity::Notice, message)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Severity::Info, message)
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Severity::Debug, message)
    }
}

/// Render control characters visibly, e.g. for logging an end-of-line value.
pub(crate) fn escape_controls(value: &str) -> String {
    value
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<(Severity, String)>>,
    }

    impl LogSink for RecordingSink {
        fn log(&self, severity: Severity, message: &str) {
            self.records
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }

    #[test]
    fn each_level_reaches_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let logger = Logger::new(sink.clone());

        logger.emerg("emerg message");
        logger.alert("alert message");
        logger.crit("crit message");
        logger.err("err message");
        logger.warning("warning message");
        logger.notice("notice message");
        logger.info("info message");
        logger.debug("debug message");
        logger.log(Severity::Info, "plain log message");

        let records = sink.records.lock().unwrap();
        let severities: Vec<Severity> = records.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Emergency,
                Severity::Alert,
                Severity::Critical,
                Severity::Error,
                Severity::Warning,
                Severity::Notice,
                Severity::Info,
                Severity::Debug,
                Severity::Info,
            ]
        );
        assert_eq!(records[3].1, "err message");
        assert_eq!(records[8].1, "plain log message");
    }

    #[test]
    fn silent_logger_is_a_no_op() {
        let logger = Logger::silent();
        assert!(!logger.is_enabled());
        logger.err("nobody hears this");
        logger.log(Severity::Emergency, "or this");
    }

    #[test]
    fn default_logger_is_silent() {
        assert!(!Logger::default().is_enabled());
        assert!(Logger::tracing().is_enabled());
    }

    #[test]
    fn severity_order_and_names() {
        assert!(Severity::Emergency < Severity::Debug);
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Critical.as_str(), "crit");
    }

    #[test]
    fn escape_controls_makes_eol_visible() {
        assert_eq!(escape_controls("\r\n\t"), "\\r\\n\\t");
        assert_eq!(escape_controls("$ "), "$ ");
    }
}

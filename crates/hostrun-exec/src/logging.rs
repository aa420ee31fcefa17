//! Process log records
//!
//! Processes do not write log records directly. They go through a
//! [`ProcessLogger`] so the sink can be swapped; [`TracingLogger`] forwards
//! everything to `tracing`.

use std::env;
use std::str::FromStr;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

/// Environment variable that forces [`LogLevel::Full`] for every process
pub const DEBUG_ENV: &str = "HOSTRUN_CONNECTION_DEBUG";

/// Structured payload attached to a log record
pub type LogData = Map<String, Value>;

/// How much of a process execution is logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No log messages are produced
    Silent,
    /// Command execution and return code are logged, output is omitted
    Short,
    /// Command execution, return code and output are logged
    #[default]
    Full,
    /// Only log the command and its result on non-zero exit code
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "short" => Ok(LogLevel::Short),
            "full" => Ok(LogLevel::Full),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Check whether a value of [`DEBUG_ENV`] enables the override
#[must_use]
pub fn is_debug_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "yes" | "1"))
}

/// Read the debug override from the environment
#[must_use]
pub fn debug_override() -> bool {
    is_debug_value(env::var(DEBUG_ENV).ok().as_deref())
}

/// Log level a process actually uses, given the debug override
#[must_use]
pub fn effective_level(requested: LogLevel, debug: bool) -> LogLevel {
    if debug { LogLevel::Full } else { requested }
}

/// Visual emphasis for human-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    /// Bold text
    Bold,
    /// Process identifier
    Id,
    /// Successful return code
    Success,
    /// Failed return code
    Failure,
}

/// Sink for process log records
pub trait ProcessLogger: Send + Sync {
    /// Emit an informational record
    fn info(&self, message: &str, data: Option<&LogData>);

    /// Emit an error record
    fn error(&self, message: &str, data: Option<&LogData>);

    /// Decorate text for display; must not change its meaning
    fn highlight(&self, text: &str, style: Highlight) -> String {
        let _ = style;
        text.to_string()
    }
}

/// Logger that emits records through `tracing`
#[derive(Debug, Clone)]
pub struct TracingLogger {
    /// Host name attached to every record
    host: String,
    /// Whether to use ANSI colors in messages
    colorize: bool,
}

impl TracingLogger {
    /// Create a new logger for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            colorize: true,
        }
    }

    /// Enable or disable ANSI colors
    #[must_use]
    pub fn with_colors(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Host name
    pub fn host(&self) -> &str {
        &self.host
    }
}

fn render(data: &LogData) -> String {
    serde_json::to_string_pretty(data).unwrap_or_default()
}

impl ProcessLogger for TracingLogger {
    fn info(&self, message: &str, data: Option<&LogData>) {
        match data {
            Some(data) => info!(host = %self.host, data = %render(data), "{message}"),
            None => info!(host = %self.host, "{message}"),
        }
    }

    fn error(&self, message: &str, data: Option<&LogData>) {
        match data {
            Some(data) => error!(host = %self.host, data = %render(data), "{message}"),
            None => error!(host = %self.host, "{message}"),
        }
    }

    fn highlight(&self, text: &str, style: Highlight) -> String {
        if !self.colorize {
            return text.to_string();
        }

        match style {
            Highlight::Bold => text.bold().to_string(),
            Highlight::Id => text.bold().bright_blue().to_string(),
            Highlight::Success => text.bold().bright_green().to_string(),
            Highlight::Failure => text.bold().bright_red().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_values() {
        assert!(is_debug_value(Some("yes")));
        assert!(is_debug_value(Some("TRUE")));
        assert!(is_debug_value(Some("1")));
        assert!(!is_debug_value(Some("no")));
        assert!(!is_debug_value(Some("")));
        assert!(!is_debug_value(None));
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(LogLevel::Silent, false), LogLevel::Silent);
        assert_eq!(effective_level(LogLevel::Error, false), LogLevel::Error);
        assert_eq!(effective_level(LogLevel::Silent, true), LogLevel::Full);
        assert_eq!(effective_level(LogLevel::Short, true), LogLevel::Full);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("Short".parse::<LogLevel>(), Ok(LogLevel::Short));
        assert_eq!("silent".parse::<LogLevel>(), Ok(LogLevel::Silent));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::default(), LogLevel::Full);
    }

    #[test]
    fn test_highlight_without_colors() {
        let logger = TracingLogger::new("client").with_colors(false);
        assert_eq!(logger.highlight("#1", Highlight::Id), "#1");
        assert_eq!(logger.host(), "client");
    }

    #[test]
    fn test_highlight_keeps_text() {
        let logger = TracingLogger::new("client");
        assert!(logger.highlight("0", Highlight::Success).contains('0'));
    }
}

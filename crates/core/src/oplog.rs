//! Per-target operation log.
//!
//! Every publish run owns exactly one log. Entries are append-only and are
//! mirrored to `tracing` so that the process log and the per-target report
//! agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry of an operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Append-only log owned by a single publish run.
#[derive(Debug, Clone)]
pub struct OperationLog {
    scope: String,
    entries: Vec<LogEntry>,
}

impl OperationLog {
    /// Create an empty log. `scope` names the owner in mirrored tracing output.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, details: Option<Value>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(scope = %self.scope, "{}", message),
            LogLevel::Info => info!(scope = %self.scope, "{}", message),
            LogLevel::Warn => warn!(scope = %self.scope, "{}", message),
            LogLevel::Error => error!(scope = %self.scope, "{}", message),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            details,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message, None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message, None);
    }

    pub fn info_with(&mut self, message: impl Into<String>, details: Value) {
        self.push(LogLevel::Info, message, Some(details));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message, None);
    }

    pub fn warn_with(&mut self, message: impl Into<String>, details: Value) {
        self.push(LogLevel::Warn, message, Some(details));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message, None);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the log into its entries.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_are_ordered() {
        let mut log = OperationLog::new("target-1");
        log.info("first");
        log.warn_with("second", json!({ "file": "a.png" }));
        log.error("third");

        let messages: Vec<&str> = log.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.last().unwrap().level, LogLevel::Error);
        assert_eq!(log.entries()[1].details, Some(json!({ "file": "a.png" })));
    }

    #[test]
    fn test_entry_serialization_skips_empty_details() {
        let mut log = OperationLog::new("t");
        log.info("hello");
        let json = serde_json::to_string(&log.into_entries()[0]).unwrap();
        assert!(json.contains("\"level\":\"info\""));
        assert!(!json.contains("details"));
    }
}

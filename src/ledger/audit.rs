use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub severity: Severity,
    pub operation: String,
    pub message: String,
}

/// Bounded operation log stored with the document. Oldest entries go first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl AuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.prune();
    }

    pub fn record(&mut self, severity: Severity, operation: &str, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => tracing::info!(operation, "{message}"),
            Severity::Warning => tracing::warn!(operation, "{message}"),
            Severity::Error => tracing::error!(operation, "{message}"),
        }
        self.entries.push_back(AuditEntry {
            timestamp: Local::now().naive_local(),
            severity,
            operation: operation.to_string(),
            message,
        });
        self.prune();
    }

    pub fn info(&mut self, operation: &str, message: impl Into<String>) {
        self.record(Severity::Info, operation, message);
    }

    pub fn warning(&mut self, operation: &str, message: impl Into<String>) {
        self.record(Severity::Warning, operation, message);
    }

    pub fn error(&mut self, operation: &str, message: impl Into<String>) {
        self.record(Severity::Error, operation, message);
    }

    /// Up to `n` entries, newest first.
    pub fn latest(&self, n: usize) -> Vec<&AuditEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prunes_oldest_first() {
        let mut log = AuditLog::with_capacity(3);
        for i in 0..5 {
            log.info("op", format!("entry {i}"));
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.latest(10).iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 4", "entry 3", "entry 2"]);
    }

    #[test]
    fn test_shrinking_capacity_prunes() {
        let mut log = AuditLog::with_capacity(10);
        log.info("op", "a");
        log.warning("op", "b");
        log.error("op", "c");
        log.set_capacity(1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest(1)[0].severity, Severity::Error);
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"WARNING\"");
        assert_eq!(Severity::Info.to_string(), "INFO");
    }
}

//! Bounded, newest-first activity log shown by the drive status endpoint.

use std::collections::VecDeque;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Entries kept before the oldest are discarded
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an entry, dropping the oldest beyond the cap
    pub fn push(&mut self, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Error => log::error!("{}", message),
            LogKind::Info | LogKind::Success => log::info!("{}", message),
        }

        self.entries.push_front(LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            message,
            kind,
        });
        self.entries.truncate(MAX_LOG_ENTRIES);
    }

    /// Snapshot, newest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let mut log = ActivityLog::new();
        log.push(LogKind::Info, "first");
        log.push(LogKind::Success, "second");

        let entries = log.entries();
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[0].kind, LogKind::Success);
        assert_eq!(entries[1].message, "first");
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn test_capped_at_fifty() {
        let mut log = ActivityLog::new();
        for i in 0..60 {
            log.push(LogKind::Info, format!("entry {}", i));
        }

        assert_eq!(log.entries().len(), MAX_LOG_ENTRIES);
        let entries = log.entries();
        assert_eq!(entries[0].message, "entry 59");
        assert_eq!(entries[MAX_LOG_ENTRIES - 1].message, "entry 10");
    }

    #[test]
    fn test_entry_json_shape() {
        let mut log = ActivityLog::new();
        log.push(LogKind::Error, "Drive polling error: boom");

        let json = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Drive polling error: boom");
        assert!(json["timestamp"].is_string());
        assert!(json["id"].is_string());
    }
}

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub context: Value,
}

impl FailureLogEntry {
    pub fn new(error: impl Into<String>, context: Value) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            error: error.into(),
            context,
        }
    }
}

/// Append-only, process-lifetime record of failures. Clones share the same
/// underlying log.
#[derive(Clone, Debug, Default)]
pub struct FailureLog {
    entries: Arc<Mutex<Vec<FailureLogEntry>>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: FailureLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    pub fn entries(&self) -> Vec<FailureLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::failure_log::{FailureLog, FailureLogEntry};

    #[test]
    fn clones_share_one_log() {
        let log = FailureLog::new();
        let shared = log.clone();

        shared.record(FailureLogEntry::new("timeout", json!({"attempt": 1})));
        log.record(FailureLogEntry::new("detached", json!({"attempt": 2})));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].error, "timeout");
        assert_eq!(entries[1].context["attempt"], 2);
        assert_ne!(entries[0].entry_id, entries[1].entry_id);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let log = FailureLog::new();
        log.record(FailureLogEntry::new("first", json!({})));

        let snapshot = log.entries();
        log.record(FailureLogEntry::new("second", json!({})));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn reset_clears_entries() {
        let log = FailureLog::new();
        log.record(FailureLogEntry::new("first", json!({})));
        log.reset();

        assert!(log.is_empty());
    }
}

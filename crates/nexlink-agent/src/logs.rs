//! The agent's local transfer log.
//!
//! Entries are appended the instant a file-receive completes, marked
//! unsynced, and pruned once the nexus confirms them. The nexus's copy is
//! permanent; the local log only holds what still needs reconciling.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use nexlink_core::{LogId, TransferLogEntry};

use crate::persist::{read_json, write_json_atomic, Result};

const LOG_FILE: &str = "transfer_log.json";

/// A log entry plus its local sync flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalLogEntry {
    #[serde(flatten)]
    entry: TransferLogEntry,
    synced_to_nexus: bool,
}

/// Durable, lock-guarded local transfer log.
pub struct TransferLogStore {
    path: PathBuf,
    inner: Mutex<Vec<LocalLogEntry>>,
}

impl TransferLogStore {
    /// Load the log from `data_dir`, or start empty.
    ///
    /// An unreadable log starts empty rather than failing startup.
    #[must_use]
    pub fn load_or_default(data_dir: &std::path::Path) -> Self {
        let path = data_dir.join(LOG_FILE);
        let entries = match read_json::<Vec<LocalLogEntry>>(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load transfer log, starting empty");
                Vec::new()
            }
        };

        Self {
            path,
            inner: Mutex::new(entries),
        }
    }

    /// Append a freshly completed transfer, marked unsynced.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be persisted.
    pub fn append(&self, entry: TransferLogEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.push(LocalLogEntry {
            entry,
            synced_to_nexus: false,
        });
        write_json_atomic(&self.path, &*inner)
    }

    /// Entries not yet confirmed by the nexus.
    #[must_use]
    pub fn unsynced(&self) -> Vec<TransferLogEntry> {
        self.inner
            .lock()
            .iter()
            .filter(|e| !e.synced_to_nexus)
            .map(|e| e.entry.clone())
            .collect()
    }

    /// Number of unconfirmed entries; carried in status reports.
    #[must_use]
    pub fn unsynced_count(&self) -> u64 {
        self.inner
            .lock()
            .iter()
            .filter(|e| !e.synced_to_nexus)
            .count() as u64
    }

    /// Prune exactly the entries the nexus confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be persisted.
    pub fn mark_synced(&self, confirmed: &[LogId]) -> Result<()> {
        if confirmed.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|e| !confirmed.contains(&e.entry.id));
        let pruned = before - inner.len();
        write_json_atomic(&self.path, &*inner)?;
        tracing::debug!(pruned, "Pruned synced transfer logs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexlink_core::AgentId;
    use tempfile::TempDir;

    fn entry(filename: &str) -> TransferLogEntry {
        TransferLogEntry {
            id: LogId::generate(),
            from_agent_id: Some(AgentId::generate()),
            from_agent_name: "ws-lab".into(),
            to_agent_id: None,
            to_agent_name: "ws-archive".into(),
            filename: filename.into(),
            file_size: 512,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn append_marks_unsynced() {
        let dir = TempDir::new().unwrap();
        let store = TransferLogStore::load_or_default(dir.path());

        store.append(entry("a.bin")).unwrap();
        store.append(entry("b.bin")).unwrap();
        assert_eq!(store.unsynced_count(), 2);
        assert_eq!(store.unsynced().len(), 2);
    }

    #[test]
    fn mark_synced_prunes_exactly_the_confirmed() {
        let dir = TempDir::new().unwrap();
        let store = TransferLogStore::load_or_default(dir.path());

        let a = entry("a.bin");
        let b = entry("b.bin");
        let a_id = a.id;
        store.append(a).unwrap();
        store.append(b).unwrap();

        store.mark_synced(&[a_id]).unwrap();
        let remaining = store.unsynced();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].filename, "b.bin");
    }

    #[test]
    fn log_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let store = TransferLogStore::load_or_default(dir.path());
            store.append(entry("a.bin")).unwrap();
        }

        let store = TransferLogStore::load_or_default(dir.path());
        assert_eq!(store.unsynced_count(), 1);
    }

    #[test]
    fn confirming_unknown_ids_is_harmless() {
        let dir = TempDir::new().unwrap();
        let store = TransferLogStore::load_or_default(dir.path());
        store.append(entry("a.bin")).unwrap();

        store.mark_synced(&[LogId::generate()]).unwrap();
        assert_eq!(store.unsynced_count(), 1);
    }
}

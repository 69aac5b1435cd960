//! Incremental state recording during apply.
//!
//! All snapshot writes during a run funnel through a single
//! [`StateRecorder`], which persists after every completed entry. Results
//! are applied in arrival order (each write is keyed by logical id and
//! independent), so a crash partway through a run leaves the snapshot
//! consistent with the operations that actually completed.

use tracing::debug;

use crate::error::Result;

use super::store::StateStore;
use super::types::{ResourceRecord, RunHistoryEntry, StateSnapshot};

/// A single snapshot mutation produced by a completed entry.
#[derive(Debug)]
pub enum StateChange {
    /// Add or replace the record for a logical id.
    Upsert(ResourceRecord),
    /// Remove the record for a logical id.
    Remove(String),
    /// No snapshot effect (NoOp entries, failed operations).
    None,
}

/// Single-writer wrapper around the snapshot and its backing store.
pub struct StateRecorder<'a> {
    /// Current snapshot (authoritative during the run).
    snapshot: StateSnapshot,
    /// Backing store, persisted to after every mutation.
    store: &'a dyn StateStore,
}

impl<'a> StateRecorder<'a> {
    /// Creates a recorder over a loaded snapshot.
    #[must_use]
    pub const fn new(snapshot: StateSnapshot, store: &'a dyn StateStore) -> Self {
        Self { snapshot, store }
    }

    /// The current snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// Applies a change and persists the snapshot immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the snapshot fails.
    pub async fn record(&mut self, change: StateChange) -> Result<()> {
        match change {
            StateChange::Upsert(record) => {
                debug!("Recording result for '{}'", record.logical_id);
                self.snapshot.upsert(record);
            }
            StateChange::Remove(logical_id) => {
                debug!("Recording removal of '{logical_id}'");
                self.snapshot.remove(&logical_id);
            }
            StateChange::None => return Ok(()),
        }
        self.store.save(&self.snapshot).await
    }

    /// Appends a run history entry and persists.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the snapshot fails.
    pub async fn record_history(&mut self, entry: RunHistoryEntry) -> Result<()> {
        self.snapshot.add_history(entry);
        self.store.save(&self.snapshot).await
    }

    /// Consumes the recorder, returning the final snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> StateSnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PropertyBag;
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn each_change_is_persisted_immediately() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut recorder = StateRecorder::new(StateSnapshot::new("demo", "dev"), &store);
        recorder
            .record(StateChange::Upsert(ResourceRecord::new(
                "net",
                "vpc-1",
                "network.vpc",
                PropertyBag::new(),
                "h1",
            )))
            .await
            .expect("record upsert");

        // A fresh load must already see the first write.
        let persisted = store.load().await.expect("load").expect("exists");
        assert!(persisted.contains("net"));

        recorder
            .record(StateChange::Remove(String::from("net")))
            .await
            .expect("record remove");

        let persisted = store.load().await.expect("load").expect("exists");
        assert!(!persisted.contains("net"));
    }

    #[tokio::test]
    async fn none_change_does_not_touch_store() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut recorder = StateRecorder::new(StateSnapshot::new("demo", "dev"), &store);
        recorder
            .record(StateChange::None)
            .await
            .expect("record noop");

        assert!(!store.exists().await.expect("exists check"));
    }
}

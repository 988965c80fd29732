//! In-memory journal.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use twin_events::{JournalEntry, Snapshot};
use twin_id::{EntityId, Revision};

use super::{check_append, Journal, JournalError};

#[derive(Debug, Default)]
struct ThingLog {
    entries: Vec<JournalEntry>,
    snapshot: Option<Snapshot>,
}

impl ThingLog {
    fn revision(&self) -> Revision {
        self.entries
            .last()
            .map(|e| e.revision)
            .unwrap_or(Revision::ZERO)
    }
}

/// Journal kept in process memory. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    logs: Mutex<HashMap<EntityId, ThingLog>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of things with at least one entry or snapshot.
    pub fn thing_count(&self) -> usize {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append(
        &self,
        entry: JournalEntry,
        expected_prior: Revision,
    ) -> Result<Revision, JournalError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let log = logs.entry(entry.entity_id.clone()).or_default();
        check_append(&entry, expected_prior, log.revision())?;

        let revision = entry.revision;
        log.entries.push(entry);
        Ok(revision)
    }

    async fn load_events(
        &self,
        entity_id: &EntityId,
        after: Revision,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(logs
            .get(entity_id)
            .map(|log| {
                log.entries
                    .iter()
                    .filter(|e| e.revision > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_latest_snapshot(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Snapshot>, JournalError> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(logs.get(entity_id).and_then(|log| log.snapshot.clone()))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), JournalError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let log = logs.entry(snapshot.entity_id().clone()).or_default();
        let newer = log
            .snapshot
            .as_ref()
            .map_or(true, |current| snapshot.revision() > current.revision());
        if newer {
            log.snapshot = Some(snapshot);
        }
        Ok(())
    }

    async fn purge_namespace(&self, namespace: &str) -> Result<usize, JournalError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = logs.len();
        logs.retain(|id, _| !id.in_namespace(namespace));
        Ok(before - logs.len())
    }
}

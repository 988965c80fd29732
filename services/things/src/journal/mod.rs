//! Journal port: the append-only event log and snapshot store.
//!
//! The journal is partitioned per thing; appends for one thing never contend
//! with appends for another. Appends are compare-and-set against the revision
//! the writer believes is current.

mod memory;
mod sqlite;

pub use memory::InMemoryJournal;
pub use sqlite::SqliteJournal;

use async_trait::async_trait;
use thiserror::Error;
use twin_events::{JournalEntry, Snapshot};
use twin_id::{EntityId, Revision};

/// Errors from journal operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// The thing is not at the revision the writer expected.
    #[error("revision conflict for {entity_id}: expected {expected}, journal is at {actual}")]
    Conflict {
        entity_id: String,
        expected: u64,
        actual: u64,
    },

    /// Storage could not be reached or failed to execute the operation.
    #[error("journal unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be encoded or decoded.
    #[error("journal serialization error: {0}")]
    Serialization(String),
}

impl JournalError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, JournalError::Unavailable(_))
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        JournalError::Serialization(err.to_string())
    }
}

/// Durable storage for thing events and snapshots.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Appends an entry if the thing is still at `expected_prior`.
    ///
    /// The entry must carry revision `expected_prior + 1`. Returns the new
    /// revision.
    async fn append(
        &self,
        entry: JournalEntry,
        expected_prior: Revision,
    ) -> Result<Revision, JournalError>;

    /// Loads all entries with a revision greater than `after`, in revision order.
    async fn load_events(
        &self,
        entity_id: &EntityId,
        after: Revision,
    ) -> Result<Vec<JournalEntry>, JournalError>;

    async fn load_latest_snapshot(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Snapshot>, JournalError>;

    /// Stores a snapshot. An older snapshot never replaces a newer one.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), JournalError>;

    /// Removes all events and snapshots of things in the namespace.
    ///
    /// Idempotent. Returns the number of distinct things removed.
    async fn purge_namespace(&self, namespace: &str) -> Result<usize, JournalError>;
}

/// Checks that `entry` may follow `current` when the writer expects `expected_prior`.
pub(crate) fn check_append(
    entry: &JournalEntry,
    expected_prior: Revision,
    current: Revision,
) -> Result<(), JournalError> {
    if current != expected_prior || entry.revision != expected_prior.next() {
        return Err(JournalError::Conflict {
            entity_id: entry.entity_id.to_string(),
            expected: expected_prior.value(),
            actual: current.value(),
        });
    }
    Ok(())
}

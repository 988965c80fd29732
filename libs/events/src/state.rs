//! Thing state and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twin_id::{EntityId, Revision};

use crate::Thing;

/// Lifecycle of a thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "thing", rename_all = "snake_case")]
pub enum Lifecycle {
    /// No creation event has been applied yet.
    Uninitialized,
    /// The thing exists and carries domain data.
    Active(Thing),
    /// Tombstone: the id and last revision are kept, the domain data is not.
    Deleted,
}

impl Lifecycle {
    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Active(_) => "active",
            Lifecycle::Deleted => "deleted",
        }
    }
}

/// State of one thing at a revision.
///
/// Only produced by applying events in order, see [`crate::apply_event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingState {
    pub entity_id: EntityId,
    pub revision: Revision,
    pub lifecycle: Lifecycle,
}

impl ThingState {
    /// State of a thing that has never been written.
    pub fn uninitialized(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            revision: Revision::ZERO,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active(_))
    }

    pub fn thing(&self) -> Option<&Thing> {
        match &self.lifecycle {
            Lifecycle::Active(thing) => Some(thing),
            Lifecycle::Uninitialized | Lifecycle::Deleted => None,
        }
    }
}

/// A thing state captured at its revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: ThingState,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn of(state: &ThingState) -> Self {
        Self {
            state: state.clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.state.entity_id
    }

    pub fn revision(&self) -> Revision {
        self.state.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uninitialized_state() {
        let state = ThingState::uninitialized(EntityId::parse("ns:t").unwrap());
        assert_eq!(state.revision, Revision::ZERO);
        assert!(!state.is_active());
        assert!(state.thing().is_none());
        assert_eq!(state.lifecycle.name(), "uninitialized");
    }

    #[test]
    fn test_lifecycle_serialization() {
        assert_eq!(
            serde_json::to_value(&Lifecycle::Deleted).unwrap(),
            json!({"status": "deleted"})
        );
        let active = serde_json::to_value(Lifecycle::Active(Thing::default())).unwrap();
        assert_eq!(active["status"], json!("active"));
        assert_eq!(active["thing"]["attributes"], json!({}));
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let mut state = ThingState::uninitialized(EntityId::parse("ns:t").unwrap());
        state.revision = Revision::new(4);
        state.lifecycle = Lifecycle::Active(Thing::default());
        let snapshot = Snapshot::of(&state);
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.revision(), Revision::new(4));
    }
}

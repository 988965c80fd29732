//! Event envelope and its persisted journal form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use twin_id::{EntityId, Revision};

use crate::{EventError, ThingEvent};

/// A typed event together with the metadata that orders and correlates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The thing this event belongs to.
    pub entity_id: EntityId,

    /// The revision the thing has after this event is applied.
    pub revision: Revision,

    /// When the event was produced.
    pub occurred_at: DateTime<Utc>,

    /// Correlation id of the command that produced the event.
    pub correlation_id: String,

    #[serde(flatten)]
    pub event: ThingEvent,
}

impl EventEnvelope {
    pub fn new(
        entity_id: EntityId,
        revision: Revision,
        correlation_id: impl Into<String>,
        event: ThingEvent,
    ) -> Self {
        Self {
            entity_id,
            revision,
            occurred_at: Utc::now(),
            correlation_id: correlation_id.into(),
            event,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Converts this envelope into its stored form.
    pub fn to_entry(&self) -> Result<JournalEntry, EventError> {
        Ok(JournalEntry {
            entity_id: self.entity_id.clone(),
            revision: self.revision,
            event_type: self.event_type().to_string(),
            occurred_at: self.occurred_at,
            correlation_id: self.correlation_id.clone(),
            payload: self.event.payload_json()?,
        })
    }
}

/// An event as stored in the journal.
///
/// The kind is an open string so the journal can hold kinds that this build
/// does not recognize; [`JournalEntry::decode`] rejects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entity_id: EntityId,
    pub revision: Revision,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub payload: Value,
}

impl JournalEntry {
    /// Decodes the stored entry into a typed envelope.
    pub fn decode(&self) -> Result<EventEnvelope, EventError> {
        let event = ThingEvent::decode(&self.event_type, self.payload.clone())?;
        Ok(EventEnvelope {
            entity_id: self.entity_id.clone(),
            revision: self.revision,
            occurred_at: self.occurred_at,
            correlation_id: self.correlation_id.clone(),
            event,
        })
    }
}

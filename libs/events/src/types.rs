//! Event type definitions for things.
//!
//! Each event kind has a payload struct with the event-specific data. The
//! journal stores the kind as a string next to the JSON payload; [`ThingEvent`]
//! converts between that stored form and the typed form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventError, Feature, JsonPointer, Thing};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Thing lifecycle
    pub const THING_CREATED: &str = "thing.created";
    pub const THING_MODIFIED: &str = "thing.modified";
    pub const THING_DELETED: &str = "thing.deleted";

    // Attributes
    pub const ATTRIBUTE_MODIFIED: &str = "thing.attribute_modified";
    pub const ATTRIBUTE_DELETED: &str = "thing.attribute_deleted";

    // Features
    pub const FEATURE_MODIFIED: &str = "thing.feature_modified";
    pub const FEATURE_DELETED: &str = "thing.feature_deleted";
    pub const FEATURE_DEFINITION_CREATED: &str = "thing.feature_definition_created";

    // Feature properties
    pub const FEATURE_PROPERTY_MODIFIED: &str = "thing.feature_property_modified";
    pub const FEATURE_PROPERTY_DELETED: &str = "thing.feature_property_deleted";
}

// =============================================================================
// Event Payloads
// =============================================================================

// -----------------------------------------------------------------------------
// Thing Events
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingCreatedPayload {
    pub thing: Thing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingModifiedPayload {
    pub thing: Thing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThingDeletedPayload {}

// -----------------------------------------------------------------------------
// Attribute Events
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModifiedPayload {
    pub pointer: JsonPointer,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDeletedPayload {
    pub pointer: JsonPointer,
}

// -----------------------------------------------------------------------------
// Feature Events
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureModifiedPayload {
    pub feature_id: String,
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDeletedPayload {
    pub feature_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefinitionCreatedPayload {
    pub feature_id: String,
    pub definition: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePropertyModifiedPayload {
    pub feature_id: String,
    pub pointer: JsonPointer,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePropertyDeletedPayload {
    pub feature_id: String,
    pub pointer: JsonPointer,
}

// =============================================================================
// Closed Event Set
// =============================================================================

/// Every event a thing can record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum ThingEvent {
    #[serde(rename = "thing.created")]
    ThingCreated(ThingCreatedPayload),
    #[serde(rename = "thing.modified")]
    ThingModified(ThingModifiedPayload),
    #[serde(rename = "thing.deleted")]
    ThingDeleted(ThingDeletedPayload),
    #[serde(rename = "thing.attribute_modified")]
    AttributeModified(AttributeModifiedPayload),
    #[serde(rename = "thing.attribute_deleted")]
    AttributeDeleted(AttributeDeletedPayload),
    #[serde(rename = "thing.feature_modified")]
    FeatureModified(FeatureModifiedPayload),
    #[serde(rename = "thing.feature_deleted")]
    FeatureDeleted(FeatureDeletedPayload),
    #[serde(rename = "thing.feature_definition_created")]
    FeatureDefinitionCreated(FeatureDefinitionCreatedPayload),
    #[serde(rename = "thing.feature_property_modified")]
    FeaturePropertyModified(FeaturePropertyModifiedPayload),
    #[serde(rename = "thing.feature_property_deleted")]
    FeaturePropertyDeleted(FeaturePropertyDeletedPayload),
}

impl ThingEvent {
    /// Returns the stored kind tag of this event.
    pub fn event_type(&self) -> &'static str {
        use event_types::*;
        match self {
            ThingEvent::ThingCreated(_) => THING_CREATED,
            ThingEvent::ThingModified(_) => THING_MODIFIED,
            ThingEvent::ThingDeleted(_) => THING_DELETED,
            ThingEvent::AttributeModified(_) => ATTRIBUTE_MODIFIED,
            ThingEvent::AttributeDeleted(_) => ATTRIBUTE_DELETED,
            ThingEvent::FeatureModified(_) => FEATURE_MODIFIED,
            ThingEvent::FeatureDeleted(_) => FEATURE_DELETED,
            ThingEvent::FeatureDefinitionCreated(_) => FEATURE_DEFINITION_CREATED,
            ThingEvent::FeaturePropertyModified(_) => FEATURE_PROPERTY_MODIFIED,
            ThingEvent::FeaturePropertyDeleted(_) => FEATURE_PROPERTY_DELETED,
        }
    }

    /// Serializes the payload alone, without the kind tag.
    pub fn payload_json(&self) -> Result<Value, EventError> {
        let value = match self {
            ThingEvent::ThingCreated(p) => serde_json::to_value(p)?,
            ThingEvent::ThingModified(p) => serde_json::to_value(p)?,
            ThingEvent::ThingDeleted(p) => serde_json::to_value(p)?,
            ThingEvent::AttributeModified(p) => serde_json::to_value(p)?,
            ThingEvent::AttributeDeleted(p) => serde_json::to_value(p)?,
            ThingEvent::FeatureModified(p) => serde_json::to_value(p)?,
            ThingEvent::FeatureDeleted(p) => serde_json::to_value(p)?,
            ThingEvent::FeatureDefinitionCreated(p) => serde_json::to_value(p)?,
            ThingEvent::FeaturePropertyModified(p) => serde_json::to_value(p)?,
            ThingEvent::FeaturePropertyDeleted(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Rebuilds a typed event from its stored kind tag and payload.
    ///
    /// A kind this build does not know is an error, never skipped.
    pub fn decode(event_type: &str, payload: Value) -> Result<Self, EventError> {
        use event_types::*;
        let event = match event_type {
            THING_CREATED => ThingEvent::ThingCreated(parse(event_type, payload)?),
            THING_MODIFIED => ThingEvent::ThingModified(parse(event_type, payload)?),
            THING_DELETED => ThingEvent::ThingDeleted(parse(event_type, payload)?),
            ATTRIBUTE_MODIFIED => ThingEvent::AttributeModified(parse(event_type, payload)?),
            ATTRIBUTE_DELETED => ThingEvent::AttributeDeleted(parse(event_type, payload)?),
            FEATURE_MODIFIED => ThingEvent::FeatureModified(parse(event_type, payload)?),
            FEATURE_DELETED => ThingEvent::FeatureDeleted(parse(event_type, payload)?),
            FEATURE_DEFINITION_CREATED => {
                ThingEvent::FeatureDefinitionCreated(parse(event_type, payload)?)
            }
            FEATURE_PROPERTY_MODIFIED => {
                ThingEvent::FeaturePropertyModified(parse(event_type, payload)?)
            }
            FEATURE_PROPERTY_DELETED => {
                ThingEvent::FeaturePropertyDeleted(parse(event_type, payload)?)
            }
            other => return Err(EventError::UnknownEventType(other.to_string())),
        };
        Ok(event)
    }
}

fn parse<T: serde::de::DeserializeOwned>(event_type: &str, payload: Value) -> Result<T, EventError> {
    serde_json::from_value(payload).map_err(|e| EventError::InvalidPayload {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when decoding or applying events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The event type is unknown.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The event payload is invalid.
    #[error("invalid event payload for {event_type}: {reason}")]
    InvalidPayload { event_type: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The event does not carry the next revision of the state.
    #[error("invalid revision sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: u64, actual: u64 },

    /// The event targets a different entity than the state.
    #[error("event for {actual} applied to state of {expected}")]
    EntityMismatch { expected: String, actual: String },

    /// The event kind is not defined for the current lifecycle.
    #[error("event {event_type} cannot be applied to a thing that is {lifecycle}")]
    InvalidTransition {
        event_type: &'static str,
        lifecycle: &'static str,
    },

    /// A JSON pointer could not be parsed.
    #[error("invalid JSON pointer '{pointer}': {reason}")]
    InvalidPointer {
        pointer: String,
        reason: &'static str,
    },
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}

//! Responses returned to callers.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use twin_events::Thing;
use twin_id::{EntityId, Revision};

use crate::{Command, Headers, SignalError};

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub headers: Headers,
    pub entity_id: EntityId,
    /// Kind of the command this responds to.
    pub kind: String,
    /// Revision of the thing after the command.
    pub revision: Revision,
    /// Current thing data, for commands that return it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing: Option<Thing>,
}

impl CommandResponse {
    pub fn for_command(command: &Command, revision: Revision) -> Self {
        Self {
            headers: command.headers.for_response(),
            entity_id: command.entity_id.clone(),
            kind: command.kind().to_string(),
            revision,
            thing: None,
        }
    }

    pub fn with_thing(mut self, thing: Thing) -> Self {
        self.thing = Some(thing);
        self
    }
}

/// Failed outcome of a command, carrying the request's correlation headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub headers: Headers,
    pub entity_id: Option<EntityId>,
    pub error: SignalError,
}

impl ErrorResponse {
    pub fn new(headers: &Headers, error: SignalError) -> Self {
        Self {
            headers: headers.for_response(),
            entity_id: None,
            error,
        }
    }

    pub fn for_command(command: &Command, error: SignalError) -> Self {
        Self {
            headers: command.headers.for_response(),
            entity_id: Some(command.entity_id.clone()),
            error,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.headers.correlation_id
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.error.code())
    }
}

impl std::error::Error for ErrorResponse {}

impl Serialize for ErrorResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("ErrorResponse", 6)?;
        s.serialize_field("headers", &self.headers)?;
        if let Some(entity_id) = &self.entity_id {
            s.serialize_field("entity_id", entity_id)?;
        } else {
            s.skip_field("entity_id")?;
        }
        s.serialize_field("kind", &self.error.kind())?;
        s.serialize_field("code", self.error.code())?;
        s.serialize_field("message", &self.error.to_string())?;
        s.serialize_field("retryable", &self.error.is_retryable())?;
        s.end()
    }
}

/// Outcome of a namespace purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeNamespaceResponse {
    pub headers: Headers,
    pub resource_type: String,
    pub namespace: String,
    /// Number of distinct things whose history was removed.
    pub purged: usize,
}

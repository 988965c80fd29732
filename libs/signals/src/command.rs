//! Commands targeting a single thing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use twin_events::{Feature, Thing};
use twin_id::{CommandId, EntityId};

use crate::Headers;

/// Resource type of every [`ThingCommand`].
pub const THING_RESOURCE_TYPE: &str = "thing";

/// The typed payload of a command.
///
/// Pointers are kept as written by the caller and validated when the command
/// is decided against the thing's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThingCommand {
    CreateThing {
        #[serde(default)]
        thing: Thing,
    },
    ModifyThing {
        thing: Thing,
    },
    DeleteThing,
    RetrieveThing,
    ModifyAttribute {
        pointer: String,
        value: Value,
    },
    DeleteAttribute {
        pointer: String,
    },
    ModifyFeature {
        feature_id: String,
        #[serde(default)]
        feature: Feature,
    },
    DeleteFeature {
        feature_id: String,
    },
    ModifyFeatureDefinition {
        feature_id: String,
        definition: Vec<String>,
    },
    ModifyFeatureProperty {
        feature_id: String,
        pointer: String,
        value: Value,
    },
    DeleteFeatureProperty {
        feature_id: String,
        pointer: String,
    },
}

impl ThingCommand {
    /// Returns the snake_case kind tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ThingCommand::CreateThing { .. } => "create_thing",
            ThingCommand::ModifyThing { .. } => "modify_thing",
            ThingCommand::DeleteThing => "delete_thing",
            ThingCommand::RetrieveThing => "retrieve_thing",
            ThingCommand::ModifyAttribute { .. } => "modify_attribute",
            ThingCommand::DeleteAttribute { .. } => "delete_attribute",
            ThingCommand::ModifyFeature { .. } => "modify_feature",
            ThingCommand::DeleteFeature { .. } => "delete_feature",
            ThingCommand::ModifyFeatureDefinition { .. } => "modify_feature_definition",
            ThingCommand::ModifyFeatureProperty { .. } => "modify_feature_property",
            ThingCommand::DeleteFeatureProperty { .. } => "delete_feature_property",
        }
    }
}

/// A request against one thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub id: CommandId,
    pub entity_id: EntityId,
    #[serde(default)]
    pub headers: Headers,
    pub payload: ThingCommand,
}

impl Command {
    /// Creates a command with a fresh id and correlation id.
    pub fn new(entity_id: EntityId, payload: ThingCommand) -> Self {
        Self {
            id: CommandId::new(),
            entity_id,
            headers: Headers::new(),
            payload,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn resource_type(&self) -> &'static str {
        THING_RESOURCE_TYPE
    }

    /// Returns true if executing this command may bring the thing into existence.
    pub fn is_creation(&self) -> bool {
        matches!(self.payload, ThingCommand::CreateThing { .. })
    }

    /// Returns true if this command only reads state.
    pub fn is_query(&self) -> bool {
        matches!(self.payload, ThingCommand::RetrieveThing)
    }

    pub fn correlation_id(&self) -> &str {
        &self.headers.correlation_id
    }
}

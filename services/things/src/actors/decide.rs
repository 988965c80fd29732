//! Turns a command into the event it should produce, given the current state.
//!
//! Pure: no I/O, no mutation. The thing actor persists the resulting event and
//! only then applies it.

use twin_events::{
    AttributeDeletedPayload, AttributeModifiedPayload, FeatureDefinitionCreatedPayload,
    FeatureDeletedPayload, FeatureModifiedPayload, FeaturePropertyDeletedPayload,
    FeaturePropertyModifiedPayload, JsonPointer, Lifecycle, Thing, ThingCreatedPayload,
    ThingDeletedPayload, ThingEvent, ThingModifiedPayload, ThingState,
};
use twin_signals::{Command, SignalError, ThingCommand};

/// Outcome of deciding a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Answer from the current state without producing an event.
    Retrieve(Thing),
    /// Persist this event.
    Persist(ThingEvent),
}

/// Decides the outcome of `command` against `state`.
pub fn decide(state: &ThingState, command: &Command) -> Result<Decision, SignalError> {
    let event = match &command.payload {
        ThingCommand::CreateThing { thing } => {
            if state.is_active() {
                return Err(SignalError::conflict(
                    "thing_already_exists",
                    format!("thing '{}' already exists", state.entity_id),
                ));
            }
            validate_features(thing)?;
            ThingEvent::ThingCreated(ThingCreatedPayload {
                thing: thing.clone(),
            })
        }
        ThingCommand::RetrieveThing => return Ok(Decision::Retrieve(active(state)?.clone())),
        ThingCommand::ModifyThing { thing } => {
            active(state)?;
            validate_features(thing)?;
            ThingEvent::ThingModified(ThingModifiedPayload {
                thing: thing.clone(),
            })
        }
        ThingCommand::DeleteThing => {
            active(state)?;
            ThingEvent::ThingDeleted(ThingDeletedPayload {})
        }
        ThingCommand::ModifyAttribute { pointer, value } => {
            active(state)?;
            ThingEvent::AttributeModified(AttributeModifiedPayload {
                pointer: parse_pointer(pointer)?,
                value: value.clone(),
            })
        }
        ThingCommand::DeleteAttribute { pointer } => {
            active(state)?;
            ThingEvent::AttributeDeleted(AttributeDeletedPayload {
                pointer: parse_pointer(pointer)?,
            })
        }
        ThingCommand::ModifyFeature {
            feature_id,
            feature,
        } => {
            active(state)?;
            validate_feature_id(feature_id)?;
            ThingEvent::FeatureModified(FeatureModifiedPayload {
                feature_id: feature_id.clone(),
                feature: feature.clone(),
            })
        }
        ThingCommand::DeleteFeature { feature_id } => {
            require_feature(state, feature_id)?;
            ThingEvent::FeatureDeleted(FeatureDeletedPayload {
                feature_id: feature_id.clone(),
            })
        }
        ThingCommand::ModifyFeatureDefinition {
            feature_id,
            definition,
        } => {
            require_feature(state, feature_id)?;
            if definition.is_empty() || definition.iter().any(|d| d.trim().is_empty()) {
                return Err(SignalError::validation(
                    "invalid_feature_definition",
                    "a feature definition needs at least one non-empty identifier",
                ));
            }
            ThingEvent::FeatureDefinitionCreated(FeatureDefinitionCreatedPayload {
                feature_id: feature_id.clone(),
                definition: definition.clone(),
            })
        }
        ThingCommand::ModifyFeatureProperty {
            feature_id,
            pointer,
            value,
        } => {
            require_feature(state, feature_id)?;
            ThingEvent::FeaturePropertyModified(FeaturePropertyModifiedPayload {
                feature_id: feature_id.clone(),
                pointer: parse_pointer(pointer)?,
                value: value.clone(),
            })
        }
        ThingCommand::DeleteFeatureProperty {
            feature_id,
            pointer,
        } => {
            require_feature(state, feature_id)?;
            ThingEvent::FeaturePropertyDeleted(FeaturePropertyDeletedPayload {
                feature_id: feature_id.clone(),
                pointer: parse_pointer(pointer)?,
            })
        }
    };

    Ok(Decision::Persist(event))
}

/// The thing, if it is active.
fn active(state: &ThingState) -> Result<&Thing, SignalError> {
    match &state.lifecycle {
        Lifecycle::Active(thing) => Ok(thing),
        Lifecycle::Uninitialized => Err(SignalError::not_found(
            "thing_not_found",
            format!("thing '{}' does not exist", state.entity_id),
        )),
        Lifecycle::Deleted => Err(SignalError::not_found(
            "thing_not_found",
            format!("thing '{}' was deleted", state.entity_id),
        )),
    }
}

/// Parses a pointer that must address something below the root.
fn parse_pointer(pointer: &str) -> Result<JsonPointer, SignalError> {
    let parsed = JsonPointer::parse(pointer)
        .map_err(|e| SignalError::validation("invalid_pointer", e.to_string()))?;
    if parsed.is_root() {
        return Err(SignalError::validation(
            "invalid_pointer",
            format!("pointer '{pointer}' must address a value, not the whole object"),
        ));
    }
    Ok(parsed)
}

fn validate_features(thing: &Thing) -> Result<(), SignalError> {
    thing.features.keys().try_for_each(|id| validate_feature_id(id))
}

fn validate_feature_id(feature_id: &str) -> Result<(), SignalError> {
    if feature_id.is_empty() || feature_id.contains('/') || feature_id.chars().any(char::is_control)
    {
        return Err(SignalError::validation(
            "invalid_feature_id",
            format!(
                "feature id '{}' must be non-empty without '/' or control characters",
                feature_id.escape_default()
            ),
        ));
    }
    Ok(())
}

fn require_feature(state: &ThingState, feature_id: &str) -> Result<(), SignalError> {
    if active(state)?.has_feature(feature_id) {
        return Ok(());
    }
    Err(SignalError::not_found(
        "feature_not_found",
        format!(
            "feature '{feature_id}' does not exist on thing '{}'",
            state.entity_id
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use twin_id::{EntityId, Revision};
    use twin_signals::ErrorKind;

    fn id() -> EntityId {
        EntityId::parse("acme:lamp").unwrap()
    }

    fn active_state() -> ThingState {
        ThingState {
            entity_id: id(),
            revision: Revision::new(2),
            lifecycle: Lifecycle::Active(
                serde_json::from_value(json!({
                    "attributes": {"room": "kitchen"},
                    "features": {"lamp": {"properties": {"on": true}}}
                }))
                .unwrap(),
            ),
        }
    }

    fn deleted() -> ThingState {
        ThingState {
            lifecycle: Lifecycle::Deleted,
            ..active_state()
        }
    }

    fn command(payload: ThingCommand) -> Command {
        Command::new(id(), payload)
    }

    #[test]
    fn test_create_on_uninitialized() {
        let decision = decide(
            &ThingState::uninitialized(id()),
            &command(ThingCommand::CreateThing {
                thing: Thing::default(),
            }),
        )
        .unwrap();
        assert!(matches!(
            decision,
            Decision::Persist(ThingEvent::ThingCreated(_))
        ));
    }

    #[test]
    fn test_create_on_tombstone_is_allowed() {
        let decision = decide(
            &deleted(),
            &command(ThingCommand::CreateThing {
                thing: Thing::default(),
            }),
        )
        .unwrap();
        assert!(matches!(
            decision,
            Decision::Persist(ThingEvent::ThingCreated(_))
        ));
    }

    #[test]
    fn test_create_on_active_conflicts() {
        let err = decide(
            &active_state(),
            &command(ThingCommand::CreateThing {
                thing: Thing::default(),
            }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "thing_already_exists");
    }

    #[test]
    fn test_retrieve_returns_thing() {
        let Decision::Retrieve(thing) = decide(&active_state(), &command(ThingCommand::RetrieveThing)).unwrap()
        else {
            panic!("expected retrieve");
        };
        assert_eq!(thing.attributes["room"], json!("kitchen"));
    }

    #[rstest]
    #[case::uninitialized(ThingState::uninitialized(id()))]
    #[case::deleted(deleted())]
    fn test_commands_on_missing_thing_are_not_found(#[case] state: ThingState) {
        for payload in [
            ThingCommand::RetrieveThing,
            ThingCommand::DeleteThing,
            ThingCommand::ModifyAttribute {
                pointer: "/a".to_string(),
                value: json!(1),
            },
        ] {
            let err = decide(&state, &command(payload)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
            assert_eq!(err.code(), "thing_not_found");
        }
    }

    #[rstest]
    #[case::delete_feature(ThingCommand::DeleteFeature { feature_id: "fan".to_string() })]
    #[case::modify_property(ThingCommand::ModifyFeatureProperty {
        feature_id: "fan".to_string(),
        pointer: "/speed".to_string(),
        value: json!(3),
    })]
    #[case::delete_property(ThingCommand::DeleteFeatureProperty {
        feature_id: "fan".to_string(),
        pointer: "/speed".to_string(),
    })]
    #[case::modify_definition(ThingCommand::ModifyFeatureDefinition {
        feature_id: "fan".to_string(),
        definition: vec!["org.example:Fan:1.0.0".to_string()],
    })]
    fn test_feature_commands_require_feature(#[case] payload: ThingCommand) {
        let err = decide(&active_state(), &command(payload)).unwrap_err();
        assert_eq!(err.code(), "feature_not_found");
    }

    #[rstest]
    #[case::empty_segment("a//b")]
    #[case::root("/")]
    fn test_invalid_pointer(#[case] pointer: &str) {
        let err = decide(
            &active_state(),
            &command(ThingCommand::ModifyAttribute {
                pointer: pointer.to_string(),
                value: json!(1),
            }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "invalid_pointer");
    }

    #[test]
    fn test_deleting_absent_property_still_produces_event() {
        let decision = decide(
            &active_state(),
            &command(ThingCommand::DeleteFeatureProperty {
                feature_id: "lamp".to_string(),
                pointer: "/missing".to_string(),
            }),
        )
        .unwrap();
        assert!(matches!(
            decision,
            Decision::Persist(ThingEvent::FeaturePropertyDeleted(_))
        ));
    }

    #[test]
    fn test_invalid_feature_id() {
        let err = decide(
            &active_state(),
            &command(ThingCommand::ModifyFeature {
                feature_id: "a/b".to_string(),
                feature: Default::default(),
            }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_feature_id");
    }

    #[test]
    fn test_empty_definition_rejected() {
        let err = decide(
            &active_state(),
            &command(ThingCommand::ModifyFeatureDefinition {
                feature_id: "lamp".to_string(),
                definition: vec![],
            }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_feature_definition");
    }
}

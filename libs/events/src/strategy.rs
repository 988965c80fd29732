//! Event strategy registry.
//!
//! One pure transition per event kind, selected by an exhaustive match. Adding
//! an event kind without a transition does not compile.

use crate::{
    event_types, AttributeDeletedPayload, AttributeModifiedPayload, EventEnvelope, EventError,
    Feature, FeatureDefinitionCreatedPayload, FeatureDeletedPayload, FeatureModifiedPayload,
    FeaturePropertyDeletedPayload, FeaturePropertyModifiedPayload, Lifecycle, Thing,
    ThingCreatedPayload, ThingEvent, ThingModifiedPayload, ThingState,
};

/// Applies the next event to a state, producing the state at the event's revision.
///
/// The envelope must target the same entity and carry exactly the next
/// revision. Deletion events never fail because the target is already absent;
/// they still advance the revision.
pub fn apply_event(state: &ThingState, envelope: &EventEnvelope) -> Result<ThingState, EventError> {
    if envelope.entity_id != state.entity_id {
        return Err(EventError::EntityMismatch {
            expected: state.entity_id.to_string(),
            actual: envelope.entity_id.to_string(),
        });
    }

    let expected = state.revision.next();
    if envelope.revision != expected {
        return Err(EventError::InvalidSequence {
            expected: expected.value(),
            actual: envelope.revision.value(),
        });
    }

    let lifecycle = match &envelope.event {
        ThingEvent::ThingCreated(p) => thing_created(&state.lifecycle, p)?,
        ThingEvent::ThingModified(p) => thing_modified(&state.lifecycle, p)?,
        ThingEvent::ThingDeleted(_) => thing_deleted(&state.lifecycle)?,
        ThingEvent::AttributeModified(p) => attribute_modified(&state.lifecycle, p)?,
        ThingEvent::AttributeDeleted(p) => attribute_deleted(&state.lifecycle, p)?,
        ThingEvent::FeatureModified(p) => feature_modified(&state.lifecycle, p)?,
        ThingEvent::FeatureDeleted(p) => feature_deleted(&state.lifecycle, p)?,
        ThingEvent::FeatureDefinitionCreated(p) => feature_definition_created(&state.lifecycle, p)?,
        ThingEvent::FeaturePropertyModified(p) => feature_property_modified(&state.lifecycle, p)?,
        ThingEvent::FeaturePropertyDeleted(p) => feature_property_deleted(&state.lifecycle, p)?,
    };

    Ok(ThingState {
        entity_id: state.entity_id.clone(),
        revision: envelope.revision,
        lifecycle,
    })
}

/// Applies a sequence of events in order, stopping at the first failure.
pub fn replay<'a, I>(initial: ThingState, events: I) -> Result<ThingState, EventError>
where
    I: IntoIterator<Item = &'a EventEnvelope>,
{
    events
        .into_iter()
        .try_fold(initial, |state, envelope| apply_event(&state, envelope))
}

fn thing_created(lifecycle: &Lifecycle, p: &ThingCreatedPayload) -> Result<Lifecycle, EventError> {
    match lifecycle {
        Lifecycle::Uninitialized | Lifecycle::Deleted => Ok(Lifecycle::Active(p.thing.clone())),
        Lifecycle::Active(_) => Err(invalid(event_types::THING_CREATED, lifecycle)),
    }
}

fn thing_modified(lifecycle: &Lifecycle, p: &ThingModifiedPayload) -> Result<Lifecycle, EventError> {
    active(lifecycle, event_types::THING_MODIFIED)?;
    Ok(Lifecycle::Active(p.thing.clone()))
}

fn thing_deleted(lifecycle: &Lifecycle) -> Result<Lifecycle, EventError> {
    active(lifecycle, event_types::THING_DELETED)?;
    Ok(Lifecycle::Deleted)
}

fn attribute_modified(
    lifecycle: &Lifecycle,
    p: &AttributeModifiedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::ATTRIBUTE_MODIFIED)?;
    p.pointer.set(&mut thing.attributes, p.value.clone());
    Ok(Lifecycle::Active(thing))
}

fn attribute_deleted(
    lifecycle: &Lifecycle,
    p: &AttributeDeletedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::ATTRIBUTE_DELETED)?;
    p.pointer.remove(&mut thing.attributes);
    Ok(Lifecycle::Active(thing))
}

fn feature_modified(
    lifecycle: &Lifecycle,
    p: &FeatureModifiedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::FEATURE_MODIFIED)?;
    thing.features.insert(p.feature_id.clone(), p.feature.clone());
    Ok(Lifecycle::Active(thing))
}

fn feature_deleted(
    lifecycle: &Lifecycle,
    p: &FeatureDeletedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::FEATURE_DELETED)?;
    thing.features.remove(&p.feature_id);
    Ok(Lifecycle::Active(thing))
}

fn feature_definition_created(
    lifecycle: &Lifecycle,
    p: &FeatureDefinitionCreatedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::FEATURE_DEFINITION_CREATED)?;
    let feature = thing
        .features
        .entry(p.feature_id.clone())
        .or_insert_with(Feature::default);
    feature.definition = Some(p.definition.clone());
    Ok(Lifecycle::Active(thing))
}

fn feature_property_modified(
    lifecycle: &Lifecycle,
    p: &FeaturePropertyModifiedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::FEATURE_PROPERTY_MODIFIED)?;
    let feature = thing
        .features
        .entry(p.feature_id.clone())
        .or_insert_with(Feature::default);
    p.pointer.set(&mut feature.properties, p.value.clone());
    Ok(Lifecycle::Active(thing))
}

fn feature_property_deleted(
    lifecycle: &Lifecycle,
    p: &FeaturePropertyDeletedPayload,
) -> Result<Lifecycle, EventError> {
    let mut thing = active(lifecycle, event_types::FEATURE_PROPERTY_DELETED)?;
    if let Some(feature) = thing.features.get_mut(&p.feature_id) {
        p.pointer.remove(&mut feature.properties);
    }
    Ok(Lifecycle::Active(thing))
}

/// Returns a copy of the active thing, or the transition error for `event_type`.
fn active(lifecycle: &Lifecycle, event_type: &'static str) -> Result<Thing, EventError> {
    match lifecycle {
        Lifecycle::Active(thing) => Ok(thing.clone()),
        Lifecycle::Uninitialized | Lifecycle::Deleted => Err(invalid(event_type, lifecycle)),
    }
}

fn invalid(event_type: &'static str, lifecycle: &Lifecycle) -> EventError {
    EventError::InvalidTransition {
        event_type,
        lifecycle: lifecycle.name(),
    }
}

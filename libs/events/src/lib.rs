//! # twin-events
//!
//! Domain model and event definitions for things.
//!
//! ## Design Principles
//!
//! - Events are immutable records of accepted commands
//! - Every event belongs to exactly one thing and carries the revision it produces
//! - The set of event kinds is closed; each kind has exactly one state transition
//! - State is only ever produced by applying events in revision order
//!
//! ## Event Types
//!
//! - Thing lifecycle (`thing.created`, `thing.modified`, `thing.deleted`)
//! - Attributes (`thing.attribute_*`)
//! - Features (`thing.feature_*`, `thing.feature_definition_created`)
//! - Feature properties (`thing.feature_property_*`)
//!
//! ## Persistence
//!
//! Events are written to the journal as [`JournalEntry`] records whose kind is a
//! plain string, so a journal may hold kinds this build does not know. Decoding
//! such an entry fails with [`EventError::UnknownEventType`].

mod envelope;
mod error;
mod model;
mod pointer;
mod state;
mod strategy;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use model::{Feature, Thing};
pub use pointer::JsonPointer;
pub use state::{Lifecycle, Snapshot, ThingState};
pub use strategy::{apply_event, replay};
pub use types::*;

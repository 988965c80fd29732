//! # twin-id
//!
//! Identifier and revision types for the twin platform.
//!
//! ## Design Principles
//!
//! - Entity IDs are caller-assigned, namespaced, and immutable once assigned
//! - All IDs have a canonical string representation with strict parsing
//! - IDs support roundtrip serialization (parse → format → parse)
//! - Revisions are gapless per entity and only ever move forward by one
//!
//! ## Entity ID Format
//!
//! Entity IDs are `{namespace}:{name}`:
//! - `acme:sensor-1`
//! - `org.eclipse.building:floor-3-hvac`
//! - `:unscoped-device` (empty namespace)
//!
//! ## Generated IDs
//!
//! Correlation and command IDs use a prefixed format: `{prefix}_{ulid}`,
//! e.g. `corr_01HV4Z2WQXKJNM8GPQY6VBKC3D`.

mod entity;
mod error;
mod types;

pub use entity::EntityId;
pub use error::IdError;
pub use types::*;


//! # twin-policy
//!
//! Checks every inbound command before it may reach a thing.
//!
//! The [`PreEnforcementPipeline`] runs a fixed, ordered chain of
//! [`PreEnforcer`]s. Each one passes the command on (possibly with amended
//! headers) or rejects it with a [`twin_signals::SignalError`], which ends the
//! chain.
//!
//! ## Creation restriction
//!
//! A creation command is allowed if the target already exists, or if it matches
//! at least one grant rule and no revoke rule. A rule matches when its resource
//! type, auth subject and namespace axes all match; an empty axis matches
//! everything. Patterns are regular expressions that must match the whole
//! input.

mod context;
mod enforcer;
mod error;
mod existence;
mod pattern;
mod pipeline;
mod rules;

pub use context::EnforcementContext;
pub use enforcer::{AuthorizationEnforcer, CreationRestrictionEnforcer, HeaderValidation, PreEnforcer};
pub use error::PolicyError;
pub use existence::{ExistenceChecker, StaticExistenceChecker};
pub use pattern::Pattern;
pub use pipeline::PreEnforcementPipeline;
pub use rules::{CreationRestriction, CreationRestrictionConfig};

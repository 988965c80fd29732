//! twin things service library
//!
//! Executes commands against things (digital twins): every command is checked
//! by the pre-enforcement pipeline, routed to the context that owns the thing,
//! and turned into an event that is persisted before it changes any state.
//!
//! ## Architecture
//!
//! ```text
//! ThingsService
//! ├── PreEnforcementPipeline   (headers, authorization, creation restriction)
//! ├── Dispatcher
//! │   └── ThingActor(id)       (per-thing state, one command at a time)
//! └── NamespaceOps             (namespace purge + notification bus)
//! ```
//!
//! ## Modules
//!
//! - `actors`: Actor framework, thing actor, and dispatcher
//! - `journal`: Event journal port with in-memory and SQLite implementations
//! - `namespace_ops`: Namespace-wide operations
//! - `existence`: Existence checks backed by the dispatcher
//! - `config`: Environment-based configuration

pub mod actors;
pub mod config;
pub mod existence;
pub mod journal;
pub mod namespace_ops;
pub mod service;

pub use service::{Reply, Request, ThingsService};

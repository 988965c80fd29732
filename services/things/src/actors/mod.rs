//! Actor-based command processing for things.
//!
//! Each thing with recent traffic has its own context: a tokio task running a
//! [`ThingActor`] with a bounded mailbox. The [`Dispatcher`] routes commands to
//! these contexts, so commands for one thing run one at a time while
//! different things proceed concurrently.
//!
//! ## Structure
//!
//! ```text
//!             Dispatcher
//!      ┌──────────┼──────────┐
//!      │          │          │
//! ThingActor ThingActor ThingActor   (one per live thing)
//!      │          │          │
//!      └──────── Journal ────┘
//! ```

pub mod decide;
pub mod dispatcher;
pub mod framework;
pub mod thing;

pub use decide::{decide, Decision};
pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use framework::{BackoffPolicy, RestartPolicy};
pub use thing::{ThingActor, ThingMessage, ThingSettings};

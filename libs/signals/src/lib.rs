//! # twin-signals
//!
//! The messages that flow into and out of the thing core.
//!
//! - [`Command`]: a typed request against one thing, with its [`Headers`]
//! - [`CommandResponse`] / [`ErrorResponse`]: the outcome, always echoing the
//!   correlation headers of the request
//! - [`SignalError`]: the error taxonomy every layer converts into at the boundary

mod command;
mod error;
mod headers;
mod response;

pub use command::{Command, ThingCommand, THING_RESOURCE_TYPE};
pub use error::{ErrorKind, SignalError};
pub use headers::Headers;
pub use response::{CommandResponse, ErrorResponse, PurgeNamespaceResponse};

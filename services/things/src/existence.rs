//! Existence checks answered by the thing contexts themselves.

use async_trait::async_trait;
use twin_id::EntityId;
use twin_policy::ExistenceChecker;
use twin_signals::{Command, ErrorKind, Headers, SignalError, ThingCommand};

use crate::actors::Dispatcher;

/// Asks the thing's context whether the thing is active.
///
/// The retrieve is submitted to the dispatcher directly, so it bypasses the
/// pre-enforcement pipeline.
#[derive(Clone)]
pub struct DispatcherExistenceChecker {
    dispatcher: Dispatcher,
}

impl DispatcherExistenceChecker {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ExistenceChecker for DispatcherExistenceChecker {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, SignalError> {
        let command = Command::new(entity_id.clone(), ThingCommand::RetrieveThing)
            .with_headers(Headers::new().extra("origin", "existence_check"));
        match self.dispatcher.submit(command).await {
            Ok(_) => Ok(true),
            Err(response) if response.error.kind() == ErrorKind::NotFound => Ok(false),
            Err(response) => Err(response.error),
        }
    }
}

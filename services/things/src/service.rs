//! The things service: pre-enforcement, dispatch, and namespace operations
//! wired together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use twin_policy::{CreationRestrictionConfig, PreEnforcementPipeline};
use twin_signals::{
    Command, CommandResponse, ErrorResponse, Headers, PurgeNamespaceResponse, THING_RESOURCE_TYPE,
};

use crate::actors::{Dispatcher, DispatcherSettings};
use crate::existence::DispatcherExistenceChecker;
use crate::journal::Journal;
use crate::namespace_ops::{NamespaceBus, NamespaceOps};

/// Capacity of the namespace notification channel.
const NAMESPACE_BUS_CAPACITY: usize = 64;

/// A request as read by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Command(Command),
    PurgeNamespace {
        resource_type: String,
        namespace: String,
        #[serde(default)]
        headers: Headers,
    },
}

/// The outcome of a [`Request`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok(CommandResponse),
    Purged(PurgeNamespaceResponse),
    Error(ErrorResponse),
}

pub struct ThingsService {
    pipeline: PreEnforcementPipeline,
    dispatcher: Dispatcher,
    namespace_ops: NamespaceOps,
}

impl ThingsService {
    /// Builds the service. Must be called from within a tokio runtime.
    pub fn new(
        journal: Arc<dyn Journal>,
        rules: CreationRestrictionConfig,
        settings: DispatcherSettings,
    ) -> Self {
        let bus = NamespaceBus::new(NAMESPACE_BUS_CAPACITY);
        let dispatcher = Dispatcher::new(journal.clone(), settings, bus.subscribe());

        let mut namespace_ops = NamespaceOps::new();
        namespace_ops.register(THING_RESOURCE_TYPE, journal, bus);

        let existence = Arc::new(DispatcherExistenceChecker::new(dispatcher.clone()));
        let pipeline = PreEnforcementPipeline::standard(Arc::new(rules), existence);
        debug!(enforcers = ?pipeline.enforcer_names(), "Built pre-enforcement pipeline");

        Self {
            pipeline,
            dispatcher,
            namespace_ops,
        }
    }

    /// Runs a command through pre-enforcement and then its thing's context.
    pub async fn handle(&self, command: Command) -> Result<CommandResponse, ErrorResponse> {
        let command = self.pipeline.apply(command).await?;
        self.dispatcher.submit(command).await
    }

    pub async fn purge_namespace(
        &self,
        resource_type: &str,
        namespace: &str,
        headers: &Headers,
    ) -> Result<PurgeNamespaceResponse, ErrorResponse> {
        self.namespace_ops
            .purge_namespace(resource_type, namespace, headers)
            .await
    }

    pub async fn handle_request(&self, request: Request) -> Reply {
        match request {
            Request::Command(command) => match self.handle(command).await {
                Ok(response) => Reply::Ok(response),
                Err(error) => Reply::Error(error),
            },
            Request::PurgeNamespace {
                resource_type,
                namespace,
                headers,
            } => match self
                .purge_namespace(&resource_type, &namespace, &headers)
                .await
            {
                Ok(response) => Reply::Purged(response),
                Err(error) => Reply::Error(error),
            },
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

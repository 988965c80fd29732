//! Inputs to enforcement decisions.

use twin_signals::{Command, Headers};

/// What a rule is evaluated against: the command's resource type, the target
/// namespace, and the command headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementContext {
    pub resource_type: String,
    pub namespace: String,
    pub headers: Headers,
}

impl EnforcementContext {
    pub fn new(
        resource_type: impl Into<String>,
        namespace: impl Into<String>,
        headers: Headers,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            namespace: namespace.into(),
            headers,
        }
    }

    pub fn of(command: &Command) -> Self {
        Self::new(
            command.resource_type(),
            command.entity_id.namespace(),
            command.headers.clone(),
        )
    }
}

//! The individual pre-enforcement steps.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use twin_signals::{Command, SignalError};

use crate::{CreationRestrictionConfig, EnforcementContext, ExistenceChecker};

/// One step of the pre-enforcement chain.
///
/// Returns the command to hand to the next step, possibly with amended
/// headers, or the error that aborts the chain.
#[async_trait]
pub trait PreEnforcer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn apply(&self, command: Command) -> Result<Command, SignalError>;
}

// =============================================================================
// Header validation
// =============================================================================

/// Checks the correlation id and the requested resource type.
///
/// Fills in the requested resource type when the caller did not set one.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderValidation;

#[async_trait]
impl PreEnforcer for HeaderValidation {
    fn name(&self) -> &'static str {
        "header_validation"
    }

    async fn apply(&self, mut command: Command) -> Result<Command, SignalError> {
        if command.headers.correlation_id.trim().is_empty() {
            return Err(SignalError::validation(
                "correlation_id_missing",
                "command must carry a non-empty correlation id",
            ));
        }

        let resource_type = command.resource_type();
        match &command.headers.requested_resource_type {
            Some(requested) if requested != resource_type => {
                return Err(SignalError::validation(
                    "resource_type_mismatch",
                    format!(
                        "requested resource type '{requested}' does not match '{resource_type}' of {}",
                        command.kind()
                    ),
                ));
            }
            Some(_) => {}
            None => {
                command.headers.requested_resource_type = Some(resource_type.to_string());
            }
        }

        Ok(command)
    }
}

// =============================================================================
// Authorization
// =============================================================================

/// Requires at least one resolved authorization subject.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizationEnforcer;

#[async_trait]
impl PreEnforcer for AuthorizationEnforcer {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn apply(&self, command: Command) -> Result<Command, SignalError> {
        if command.headers.auth_subjects.is_empty() {
            return Err(SignalError::authorization_denied(
                "authorization_subjects_missing",
                format!(
                    "{} on '{}' carries no authorization subjects",
                    command.kind(),
                    command.entity_id
                ),
            ));
        }
        Ok(command)
    }
}

// =============================================================================
// Creation restriction
// =============================================================================

/// Decides whether a creation command may bring a new thing into existence.
///
/// Non-creation commands pass through untouched.
pub struct CreationRestrictionEnforcer {
    rules: Arc<CreationRestrictionConfig>,
    existence: Arc<dyn ExistenceChecker>,
}

impl CreationRestrictionEnforcer {
    pub fn new(rules: Arc<CreationRestrictionConfig>, existence: Arc<dyn ExistenceChecker>) -> Self {
        Self { rules, existence }
    }
}

#[async_trait]
impl PreEnforcer for CreationRestrictionEnforcer {
    fn name(&self) -> &'static str {
        "creation_restriction"
    }

    async fn apply(&self, command: Command) -> Result<Command, SignalError> {
        if !command.is_creation() {
            return Ok(command);
        }

        let exists = self.existence.exists(&command.entity_id).await?;
        let context = EnforcementContext::of(&command);
        if exists || self.rules.can_create(&context) {
            debug!(
                correlation_id = %command.headers.correlation_id,
                entity_id = %command.entity_id,
                exists,
                "creation permitted"
            );
            return Ok(command);
        }

        Err(SignalError::authorization_denied(
            "entity_not_creatable",
            format!(
                "the {} '{}' could not be created: not allowed in namespace '{}'",
                context.resource_type,
                command.entity_id,
                context.namespace
            ),
        ))
    }
}

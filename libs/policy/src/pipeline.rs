//! The ordered pre-enforcement chain.

use std::sync::Arc;

use tracing::debug;
use twin_signals::{Command, ErrorResponse};

use crate::{
    AuthorizationEnforcer, CreationRestrictionConfig, CreationRestrictionEnforcer,
    ExistenceChecker, HeaderValidation, PreEnforcer,
};

/// Runs every [`PreEnforcer`] in order, stopping at the first rejection.
pub struct PreEnforcementPipeline {
    enforcers: Vec<Box<dyn PreEnforcer>>,
}

impl PreEnforcementPipeline {
    pub fn new(enforcers: Vec<Box<dyn PreEnforcer>>) -> Self {
        Self { enforcers }
    }

    /// The default chain: header validation, authorization, creation restriction.
    pub fn standard(
        rules: Arc<CreationRestrictionConfig>,
        existence: Arc<dyn ExistenceChecker>,
    ) -> Self {
        Self::new(vec![
            Box::new(HeaderValidation),
            Box::new(AuthorizationEnforcer),
            Box::new(CreationRestrictionEnforcer::new(rules, existence)),
        ])
    }

    /// Names of the enforcers, in execution order.
    pub fn enforcer_names(&self) -> Vec<&'static str> {
        self.enforcers.iter().map(|e| e.name()).collect()
    }

    /// Passes the command through every enforcer.
    ///
    /// Rejections carry the original correlation headers.
    pub async fn apply(&self, command: Command) -> Result<Command, ErrorResponse> {
        let mut current = command;
        for enforcer in &self.enforcers {
            let original = current.clone();
            current = enforcer.apply(current).await.map_err(|error| {
                debug!(
                    correlation_id = %original.headers.correlation_id,
                    entity_id = %original.entity_id,
                    enforcer = enforcer.name(),
                    code = error.code(),
                    "command rejected"
                );
                ErrorResponse::for_command(&original, error)
            })?;
        }
        Ok(current)
    }
}

//! Existence checks used by the creation restriction.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use twin_id::EntityId;
use twin_signals::SignalError;

/// Answers whether a thing currently exists.
#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, SignalError>;
}

/// Existence checker backed by a fixed set of ids.
#[derive(Debug, Default)]
pub struct StaticExistenceChecker {
    known: RwLock<HashSet<EntityId>>,
}

impl StaticExistenceChecker {
    pub fn new(known: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            known: RwLock::new(known.into_iter().collect()),
        }
    }

    pub fn insert(&self, entity_id: EntityId) {
        if let Ok(mut known) = self.known.write() {
            known.insert(entity_id);
        }
    }
}

#[async_trait]
impl ExistenceChecker for StaticExistenceChecker {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, SignalError> {
        let known = self
            .known
            .read()
            .map_err(|_| SignalError::internal("existence set lock poisoned"))?;
        Ok(known.contains(entity_id))
    }
}

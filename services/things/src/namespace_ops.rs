//! Namespace-wide operations.
//!
//! A purge removes the stored history of every thing in a namespace and then
//! tells live contexts of that namespace to stop, so no context keeps serving
//! state that no longer exists.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use twin_signals::{ErrorResponse, Headers, PurgeNamespaceResponse, SignalError};

use crate::journal::Journal;

/// Notification published on a resource type's namespace bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    /// All history of the namespace was removed.
    Purged {
        namespace: String,
        correlation_id: String,
    },
}

/// Broadcast channel for namespace notifications of one resource type.
#[derive(Debug, Clone)]
pub struct NamespaceBus {
    tx: broadcast::Sender<NamespaceEvent>,
}

impl NamespaceBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NamespaceEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Returns how many subscribers received it.
    pub fn publish(&self, event: NamespaceEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

struct Registration {
    journal: Arc<dyn Journal>,
    bus: NamespaceBus,
}

/// Coordinates namespace operations across registered resource types.
#[derive(Default)]
pub struct NamespaceOps {
    registrations: HashMap<String, Registration>,
}

impl NamespaceOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the journal and bus responsible for a resource type.
    pub fn register(&mut self, resource_type: impl Into<String>, journal: Arc<dyn Journal>, bus: NamespaceBus) {
        let resource_type = resource_type.into();
        debug!(resource_type = %resource_type, "Registered resource type for namespace operations");
        self.registrations
            .insert(resource_type, Registration { journal, bus });
    }

    pub fn is_registered(&self, resource_type: &str) -> bool {
        self.registrations.contains_key(resource_type)
    }

    /// Removes all events and snapshots of the namespace and stops its live contexts.
    pub async fn purge_namespace(
        &self,
        resource_type: &str,
        namespace: &str,
        headers: &Headers,
    ) -> Result<PurgeNamespaceResponse, ErrorResponse> {
        let Some(registration) = self.registrations.get(resource_type) else {
            return Err(ErrorResponse::new(
                headers,
                SignalError::validation(
                    "resource_type_not_registered",
                    format!("no journal is registered for resource type '{resource_type}'"),
                ),
            ));
        };

        let purged = registration
            .journal
            .purge_namespace(namespace)
            .await
            .map_err(|e| {
                warn!(
                    resource_type = %resource_type,
                    namespace = %namespace,
                    correlation_id = %headers.correlation_id,
                    error = %e,
                    "Namespace purge failed"
                );
                ErrorResponse::new(headers, SignalError::persistence(e.to_string()))
            })?;

        let receivers = registration.bus.publish(NamespaceEvent::Purged {
            namespace: namespace.to_string(),
            correlation_id: headers.correlation_id.clone(),
        });

        info!(
            resource_type = %resource_type,
            namespace = %namespace,
            correlation_id = %headers.correlation_id,
            purged,
            receivers,
            "Purged namespace"
        );

        Ok(PurgeNamespaceResponse {
            headers: headers.for_response(),
            resource_type: resource_type.to_string(),
            namespace: namespace.to_string(),
            purged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use twin_events::{JournalEntry, ThingCreatedPayload, ThingEvent};
    use twin_id::{EntityId, Revision};
    use twin_signals::ErrorKind;

    async fn seed(journal: &InMemoryJournal, entity_id: &str) {
        let event = ThingEvent::ThingCreated(ThingCreatedPayload {
            thing: Default::default(),
        });
        let entry = JournalEntry {
            entity_id: EntityId::parse(entity_id).unwrap(),
            revision: Revision::new(1),
            event_type: event.event_type().to_string(),
            occurred_at: chrono::Utc::now(),
            correlation_id: "seed".to_string(),
            payload: event.payload_json().unwrap(),
        };
        journal.append(entry, Revision::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_history_and_notifies() {
        let journal = Arc::new(InMemoryJournal::new());
        seed(&journal, "acme:a").await;
        seed(&journal, "acme:b").await;
        seed(&journal, "other:a").await;

        let bus = NamespaceBus::new(8);
        let mut rx = bus.subscribe();
        let mut ops = NamespaceOps::new();
        ops.register("thing", journal.clone(), bus);

        let headers = Headers::with_correlation_id("purge-1");
        let response = ops.purge_namespace("thing", "acme", &headers).await.unwrap();
        assert_eq!(response.purged, 2);
        assert_eq!(response.headers.correlation_id, "purge-1");
        assert_eq!(journal.thing_count(), 1);

        assert_eq!(
            rx.recv().await.unwrap(),
            NamespaceEvent::Purged {
                namespace: "acme".to_string(),
                correlation_id: "purge-1".to_string(),
            }
        );

        let again = ops.purge_namespace("thing", "acme", &headers).await.unwrap();
        assert_eq!(again.purged, 0);
    }

    #[tokio::test]
    async fn test_purge_without_subscribers_succeeds() {
        let mut ops = NamespaceOps::new();
        ops.register("thing", Arc::new(InMemoryJournal::new()), NamespaceBus::new(8));
        let response = ops
            .purge_namespace("thing", "acme", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.purged, 0);
    }

    #[tokio::test]
    async fn test_unregistered_resource_type_fails_fast() {
        let ops = NamespaceOps::new();
        let err = ops
            .purge_namespace("policy", "acme", &Headers::with_correlation_id("c-2"))
            .await
            .unwrap_err();
        assert_eq!(err.error.kind(), ErrorKind::Validation);
        assert_eq!(err.error.code(), "resource_type_not_registered");
        assert_eq!(err.correlation_id(), "c-2");
        assert!(!ops.is_registered("policy"));
    }
}

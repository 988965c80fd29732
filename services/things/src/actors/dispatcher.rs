//! Routes commands to per-thing contexts.
//!
//! The dispatcher only knows which context serves which thing; the state lives
//! in the contexts. Contexts are spawned on the first command for a thing,
//! retire when idle, and are restarted when they die mid-command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twin_id::EntityId;
use twin_signals::{Command, CommandResponse, ErrorResponse, SignalError};

use super::framework::{self, ActorHandle, ActorRef, RestartHistory, RestartPolicy};
use super::thing::{ThingActor, ThingMessage, ThingSettings};
use crate::journal::Journal;
use crate::namespace_ops::NamespaceEvent;

/// How many times a command is re-sent after finding its context retired.
const MAX_SEND_ATTEMPTS: usize = 3;

/// How long `shutdown` waits for contexts before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Deadline for commands that carry no timeout header.
    pub ask_timeout: Duration,

    /// Contexts without traffic for this long retire. `None` keeps them forever.
    pub idle_timeout: Option<Duration>,

    pub mailbox_size: usize,

    pub thing: ThingSettings,

    pub restart_policy: RestartPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(600)),
            mailbox_size: 64,
            thing: ThingSettings::default(),
            restart_policy: RestartPolicy::default(),
        }
    }
}

struct ThingContext {
    handle: ActorHandle<ThingMessage>,
    actor_ref: ActorRef,
}

struct Inner {
    journal: Arc<dyn Journal>,
    settings: DispatcherSettings,
    contexts: Mutex<HashMap<EntityId, ThingContext>>,
    restarts: Mutex<HashMap<EntityId, RestartHistory>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

/// Command dispatcher for things. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher and starts listening for namespace purges.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        journal: Arc<dyn Journal>,
        settings: DispatcherSettings,
        purges: broadcast::Receiver<NamespaceEvent>,
    ) -> Self {
        let inner = Arc::new(Inner {
            journal,
            settings,
            contexts: Mutex::new(HashMap::new()),
            restarts: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        });

        let listener = tokio::spawn(listen_for_purges(Arc::downgrade(&inner), purges));
        *lock(&inner.listener) = Some(listener);

        Self { inner }
    }

    /// Submits a command to the context of its thing and waits for the outcome.
    pub async fn submit(&self, command: Command) -> Result<CommandResponse, ErrorResponse> {
        let deadline = command
            .headers
            .deadline()
            .unwrap_or(self.inner.settings.ask_timeout);
        let headers = command.headers.for_response();
        let entity_id = command.entity_id.clone();

        let error = match tokio::time::timeout(deadline, self.ask(command)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(error)) => error,
            Err(_) => {
                warn!(
                    entity_id = %entity_id,
                    correlation_id = %headers.correlation_id,
                    timeout_ms = deadline.as_millis() as u64,
                    "Command timed out"
                );
                SignalError::Timeout {
                    timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                }
            }
        };

        Err(ErrorResponse {
            headers,
            entity_id: Some(entity_id),
            error,
        })
    }

    async fn ask(&self, command: Command) -> Result<CommandResponse, SignalError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(SignalError::internal_retryable("dispatcher is shutting down"));
        }

        let entity_id = command.entity_id.clone();
        let (reply, response) = oneshot::channel();
        let mut message = ThingMessage { command, reply };

        let mut delivered_to = None;
        for _ in 0..MAX_SEND_ATTEMPTS {
            let handle = self.inner.context_for(&entity_id);
            match handle.send_or_return(message).await {
                Ok(()) => {
                    delivered_to = Some(handle.actor_id().to_string());
                    break;
                }
                Err(returned) => {
                    debug!(entity_id = %entity_id, actor_id = %handle.actor_id(), "Context retired, respawning");
                    self.inner.forget(&entity_id, handle.actor_id());
                    message = returned;
                }
            }
        }
        let Some(actor_id) = delivered_to else {
            return Err(SignalError::internal_retryable(format!(
                "no context accepted the command for '{entity_id}'"
            )));
        };

        match response.await {
            Ok(result) => result,
            Err(_) => {
                warn!(entity_id = %entity_id, actor_id = %actor_id, "Thing context died without replying");
                self.inner.restart(&entity_id, &actor_id);
                Err(SignalError::internal_retryable(format!(
                    "context of thing '{entity_id}' stopped while handling the command"
                )))
            }
        }
    }

    /// Number of contexts currently accepting commands.
    pub fn live_contexts(&self) -> usize {
        let mut contexts = lock(&self.inner.contexts);
        sweep(&mut contexts);
        contexts.len()
    }

    /// Returns true if a context for the thing is currently accepting commands.
    pub fn is_live(&self, entity_id: &EntityId) -> bool {
        lock(&self.inner.contexts)
            .get(entity_id)
            .is_some_and(|context| !context.handle.is_closed())
    }

    /// Stops every context. Commands submitted afterwards fail as retryable.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }

        let contexts: Vec<ThingContext> = lock(&self.inner.contexts)
            .drain()
            .map(|(_, context)| context)
            .collect();
        info!(contexts = contexts.len(), "Stopping thing contexts");

        for context in &contexts {
            context.actor_ref.stop();
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while contexts.iter().any(|c| c.actor_ref.is_running()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for context in &contexts {
            if context.actor_ref.is_running() {
                warn!(actor_id = %context.actor_ref.actor_id, "Aborting thing context");
                context.actor_ref.abort();
            }
        }
    }
}

impl Inner {
    /// Returns a handle to a live context for the thing, spawning one if needed.
    fn context_for(&self, entity_id: &EntityId) -> ActorHandle<ThingMessage> {
        let mut contexts = lock(&self.contexts);
        if let Some(context) = contexts.get(entity_id) {
            if !context.handle.is_closed() {
                return context.handle.clone();
            }
        }

        sweep(&mut contexts);
        let context = self.spawn_context(entity_id.clone(), None);
        let handle = context.handle.clone();
        contexts.insert(entity_id.clone(), context);
        handle
    }

    fn spawn_context(&self, entity_id: EntityId, start_delay: Option<Duration>) -> ThingContext {
        let actor = ThingActor::new(
            entity_id.clone(),
            self.journal.clone(),
            self.settings.thing.clone(),
        )
        .with_start_delay(start_delay);
        let (handle, actor_ref) =
            framework::spawn(actor, self.settings.mailbox_size, self.settings.idle_timeout);
        info!(entity_id = %entity_id, actor_id = %handle.actor_id(), "Spawned thing context");
        ThingContext { handle, actor_ref }
    }

    /// Removes the context if it is still the one with `actor_id`.
    fn forget(&self, entity_id: &EntityId, actor_id: &str) {
        let mut contexts = lock(&self.contexts);
        if contexts
            .get(entity_id)
            .is_some_and(|context| context.handle.actor_id() == actor_id)
        {
            contexts.remove(entity_id);
        }
    }

    /// Replaces a dead context, unless it was already replaced or the restart
    /// budget is used up.
    fn restart(&self, entity_id: &EntityId, dead_actor_id: &str) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let mut contexts = lock(&self.contexts);
        if contexts
            .get(entity_id)
            .is_some_and(|context| context.handle.actor_id() != dead_actor_id)
        {
            return;
        }
        contexts.remove(entity_id);

        let delay = lock(&self.restarts)
            .entry(entity_id.clone())
            .or_default()
            .admit(&self.settings.restart_policy);

        match delay {
            Some(delay) => {
                info!(
                    entity_id = %entity_id,
                    delay_ms = delay.as_millis() as u64,
                    "Restarting thing context"
                );
                let context = self.spawn_context(entity_id.clone(), Some(delay));
                contexts.insert(entity_id.clone(), context);
            }
            None => {
                warn!(
                    entity_id = %entity_id,
                    "Restart budget exhausted, context will be re-created on the next command"
                );
            }
        }
    }

    /// Stops every live context in the namespace and forgets its restart history.
    fn purge_namespace(&self, namespace: &str, correlation_id: &str) {
        let mut contexts = lock(&self.contexts);
        let affected: Vec<EntityId> = contexts
            .keys()
            .filter(|id| id.in_namespace(namespace))
            .cloned()
            .collect();

        for entity_id in &affected {
            if let Some(context) = contexts.remove(entity_id) {
                context.actor_ref.stop();
            }
        }
        lock(&self.restarts).retain(|id, _| !id.in_namespace(namespace));

        info!(
            namespace = %namespace,
            correlation_id = %correlation_id,
            stopped = affected.len(),
            "Stopped thing contexts of purged namespace"
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
    }
}

async fn listen_for_purges(inner: Weak<Inner>, mut purges: broadcast::Receiver<NamespaceEvent>) {
    loop {
        match purges.recv().await {
            Ok(NamespaceEvent::Purged {
                namespace,
                correlation_id,
            }) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                inner.purge_namespace(&namespace, &correlation_id);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Namespace listener lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn sweep(contexts: &mut HashMap<EntityId, ThingContext>) {
    contexts.retain(|_, context| !context.handle.is_closed());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use serde_json::json;
    use twin_id::Revision;
    use twin_signals::{ErrorKind, Headers, ThingCommand};

    fn dispatcher(settings: DispatcherSettings) -> (Dispatcher, broadcast::Sender<NamespaceEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let dispatcher = Dispatcher::new(Arc::new(InMemoryJournal::new()), settings, rx);
        (dispatcher, tx)
    }

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn create(entity_id: &str) -> Command {
        Command::new(
            id(entity_id),
            ThingCommand::CreateThing {
                thing: Default::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_submit_spawns_context_lazily() {
        let (dispatcher, _bus) = dispatcher(DispatcherSettings::default());
        assert_eq!(dispatcher.live_contexts(), 0);

        let response = dispatcher.submit(create("acme:lamp")).await.unwrap();
        assert_eq!(response.revision, Revision::new(1));
        assert!(dispatcher.is_live(&id("acme:lamp")));
        assert_eq!(dispatcher.live_contexts(), 1);
    }

    #[tokio::test]
    async fn test_error_response_carries_headers() {
        let (dispatcher, _bus) = dispatcher(DispatcherSettings::default());
        let command = Command::new(id("acme:lamp"), ThingCommand::RetrieveThing)
            .with_headers(Headers::with_correlation_id("c-42"));

        let err = dispatcher.submit(command).await.unwrap_err();
        assert_eq!(err.correlation_id(), "c-42");
        assert_eq!(err.entity_id, Some(id("acme:lamp")));
        assert_eq!(err.error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_purge_event_stops_namespace_contexts() {
        let (dispatcher, bus) = dispatcher(DispatcherSettings::default());
        dispatcher.submit(create("acme:lamp")).await.unwrap();
        dispatcher.submit(create("other:lamp")).await.unwrap();

        bus.send(NamespaceEvent::Purged {
            namespace: "acme".to_string(),
            correlation_id: "c-1".to_string(),
        })
        .unwrap();

        for _ in 0..100 {
            if !dispatcher.is_live(&id("acme:lamp")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dispatcher.is_live(&id("acme:lamp")));
        assert!(dispatcher.is_live(&id("other:lamp")));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_commands() {
        let (dispatcher, _bus) = dispatcher(DispatcherSettings::default());
        dispatcher.submit(create("acme:lamp")).await.unwrap();
        dispatcher.shutdown().await;

        assert_eq!(dispatcher.live_contexts(), 0);
        let err = dispatcher
            .submit(Command::new(
                id("acme:lamp"),
                ThingCommand::ModifyAttribute {
                    pointer: "/a".to_string(),
                    value: json!(1),
                },
            ))
            .await
            .unwrap_err();
        assert!(err.error.is_retryable());
    }
}

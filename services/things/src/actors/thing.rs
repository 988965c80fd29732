//! Thing actor: owns the state of exactly one thing.
//!
//! On start the actor recovers its state from the journal (latest snapshot plus
//! the events after it). Commands are then handled one at a time: decide the
//! event, append it to the journal, and only then apply it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use twin_events::{apply_event, EventEnvelope, EventError, Snapshot, ThingState};
use twin_id::{EntityId, Revision};
use twin_signals::{Command, CommandResponse, SignalError};

use super::decide::{decide, Decision};
use super::framework::{Actor, ActorContext, ActorState, BackoffPolicy};
use crate::journal::{Journal, JournalError};

/// A command for a thing together with the channel its outcome is sent on.
#[derive(Debug)]
pub struct ThingMessage {
    pub command: Command,
    pub reply: oneshot::Sender<Result<CommandResponse, SignalError>>,
}

/// Per-thing tuning.
#[derive(Debug, Clone)]
pub struct ThingSettings {
    /// Save a snapshot whenever the revision is a multiple of this. 0 disables snapshots.
    pub snapshot_interval: u64,

    /// Retries of a transient journal read during recovery.
    pub recovery_attempts: u32,

    pub recovery_backoff: BackoffPolicy,
}

impl Default for ThingSettings {
    fn default() -> Self {
        Self {
            snapshot_interval: 10,
            recovery_attempts: 3,
            recovery_backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
enum RecoveryError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Event(#[from] EventError),
}

#[derive(Debug)]
enum Mode {
    /// Recovered and accepting commands.
    Ready(ThingState),
    /// The journal holds history this build cannot apply.
    Failed { reason: String },
    /// The journal could not be read.
    Unavailable { reason: String },
}

pub struct ThingActor {
    entity_id: EntityId,
    journal: Arc<dyn Journal>,
    settings: ThingSettings,
    start_delay: Option<Duration>,
    mode: Mode,
}

impl ThingActor {
    pub fn new(entity_id: EntityId, journal: Arc<dyn Journal>, settings: ThingSettings) -> Self {
        let state = ThingState::uninitialized(entity_id.clone());
        Self {
            entity_id,
            journal,
            settings,
            start_delay: None,
            mode: Mode::Ready(state),
        }
    }

    /// Waits this long before recovering. Used when restarting after a crash.
    pub fn with_start_delay(mut self, delay: Option<Duration>) -> Self {
        self.start_delay = delay;
        self
    }

    async fn recover(&self) -> Mode {
        let mut attempt = 0;
        loop {
            match self.load().await {
                Ok(state) => {
                    debug!(
                        entity_id = %self.entity_id,
                        revision = state.revision.value(),
                        lifecycle = state.lifecycle.name(),
                        "Recovered thing"
                    );
                    return Mode::Ready(state);
                }
                Err(RecoveryError::Journal(e)) if e.is_transient() => {
                    if attempt >= self.settings.recovery_attempts {
                        error!(
                            entity_id = %self.entity_id,
                            attempts = attempt + 1,
                            error = %e,
                            "Giving up on thing recovery"
                        );
                        return Mode::Unavailable {
                            reason: e.to_string(),
                        };
                    }
                    let delay = self.settings.recovery_backoff.delay(attempt);
                    warn!(
                        entity_id = %self.entity_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Thing recovery failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(entity_id = %self.entity_id, error = %e, "Thing history cannot be replayed");
                    return Mode::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    async fn load(&self) -> Result<ThingState, RecoveryError> {
        let initial = match self.journal.load_latest_snapshot(&self.entity_id).await? {
            Some(snapshot) if snapshot.entity_id() == &self.entity_id => snapshot.state,
            _ => ThingState::uninitialized(self.entity_id.clone()),
        };

        let entries = self.journal.load_events(&self.entity_id, initial.revision).await?;
        let mut state = initial;
        for entry in &entries {
            let envelope = entry.decode()?;
            state = apply_event(&state, &envelope)?;
        }
        Ok(state)
    }

    fn ready_state(&self) -> Result<&ThingState, SignalError> {
        match &self.mode {
            Mode::Ready(state) => Ok(state),
            Mode::Failed { reason } => Err(SignalError::internal(format!(
                "thing '{}' cannot be recovered: {reason}",
                self.entity_id
            ))),
            Mode::Unavailable { reason } => Err(SignalError::persistence(format!(
                "thing '{}' could not be loaded: {reason}",
                self.entity_id
            ))),
        }
    }

    async fn process(&mut self, command: Command) -> Result<CommandResponse, SignalError> {
        let (current, decision) = {
            let state = self.ready_state()?;
            if let Some(expected) = command.headers.expected_revision {
                if expected != state.revision {
                    return Err(SignalError::conflict(
                        "revision_mismatch",
                        format!(
                            "expected revision {expected}, thing '{}' is at {}",
                            self.entity_id, state.revision
                        ),
                    ));
                }
            }
            (state.revision, decide(state, &command)?)
        };

        let event = match decision {
            Decision::Retrieve(thing) => {
                return Ok(CommandResponse::for_command(&command, current).with_thing(thing));
            }
            Decision::Persist(event) => event,
        };

        let revision = current.next();
        let envelope = EventEnvelope::new(
            self.entity_id.clone(),
            revision,
            command.correlation_id(),
            event,
        );
        let entry = envelope
            .to_entry()
            .map_err(|e| SignalError::internal(format!("event could not be encoded: {e}")))?;

        if let Err(e) = self.journal.append(entry, current).await {
            return Err(self.append_failed(e).await);
        }

        let next = match apply_event(self.ready_state()?, &envelope) {
            Ok(next) => next,
            Err(e) => {
                error!(
                    entity_id = %self.entity_id,
                    revision = revision.value(),
                    error = %e,
                    "Persisted event could not be applied"
                );
                self.mode = Mode::Failed {
                    reason: e.to_string(),
                };
                return Err(SignalError::internal(format!(
                    "persisted event could not be applied: {e}"
                )));
            }
        };

        debug!(
            entity_id = %self.entity_id,
            correlation_id = %command.correlation_id(),
            event_type = envelope.event_type(),
            revision = revision.value(),
            "Persisted event"
        );

        let mut response = CommandResponse::for_command(&command, revision);
        if command.is_creation() {
            if let Some(thing) = next.thing() {
                response = response.with_thing(thing.clone());
            }
        }

        if self.snapshot_due(revision) {
            self.save_snapshot(Snapshot::of(&next)).await;
        }
        self.mode = Mode::Ready(next);

        Ok(response)
    }

    async fn append_failed(&mut self, error: JournalError) -> SignalError {
        match error {
            JournalError::Conflict {
                expected, actual, ..
            } => {
                warn!(
                    entity_id = %self.entity_id,
                    expected,
                    actual,
                    "Journal moved underneath the thing, reloading"
                );
                self.mode = self.recover().await;
                SignalError::conflict(
                    "journal_conflict",
                    format!("journal for '{}' is at revision {actual}, not {expected}", self.entity_id),
                )
            }
            JournalError::Unavailable(reason) => SignalError::persistence(reason),
            JournalError::Serialization(reason) => SignalError::internal(reason),
        }
    }

    fn snapshot_due(&self, revision: Revision) -> bool {
        self.settings.snapshot_interval > 0 && revision.value() % self.settings.snapshot_interval == 0
    }

    async fn save_snapshot(&self, snapshot: Snapshot) {
        let revision = snapshot.revision();
        match self.journal.save_snapshot(snapshot).await {
            Ok(()) => debug!(entity_id = %self.entity_id, revision = revision.value(), "Saved snapshot"),
            Err(e) => warn!(
                entity_id = %self.entity_id,
                revision = revision.value(),
                error = %e,
                "Failed to save snapshot"
            ),
        }
    }
}

#[async_trait]
impl Actor for ThingActor {
    type Message = ThingMessage;

    fn name(&self) -> &str {
        "thing"
    }

    async fn on_start(&mut self, _ctx: &mut ActorContext) {
        if let Some(delay) = self.start_delay.take() {
            tokio::time::sleep(delay).await;
        }
        self.mode = self.recover().await;
    }

    /// Stops after answering while the journal is unreadable, so the next
    /// command starts a fresh context that recovers again.
    async fn handle(&mut self, msg: ThingMessage, _ctx: &mut ActorContext) -> bool {
        let ThingMessage { command, reply } = msg;
        let correlation_id = command.correlation_id().to_string();
        let result = self.process(command).await;
        if let Err(e) = &result {
            debug!(
                entity_id = %self.entity_id,
                correlation_id = %correlation_id,
                code = e.code(),
                "Command failed"
            );
        }
        if reply.send(result).is_err() {
            debug!(entity_id = %self.entity_id, correlation_id = %correlation_id, "Caller no longer waiting");
        }
        !matches!(self.mode, Mode::Unavailable { .. })
    }

    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        if ctx.state == ActorState::Retiring {
            info!(entity_id = %self.entity_id, actor_id = %ctx.actor_id, "Retired idle thing context");
        } else {
            info!(entity_id = %self.entity_id, actor_id = %ctx.actor_id, "Stopped thing context");
        }
    }

    fn reject(&mut self, msg: ThingMessage) {
        let _ = msg.reply.send(Err(SignalError::internal_retryable(format!(
            "context of thing '{}' stopped before handling the command",
            self.entity_id
        ))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::framework::spawn;
    use crate::journal::InMemoryJournal;
    use serde_json::json;
    use twin_events::{JournalEntry, Lifecycle};
    use twin_signals::{ErrorKind, Headers, ThingCommand};

    fn id() -> EntityId {
        EntityId::parse("acme:lamp").unwrap()
    }

    fn actor(journal: Arc<InMemoryJournal>, settings: ThingSettings) -> ThingActor {
        ThingActor::new(id(), journal, settings)
    }

    async fn started(journal: Arc<InMemoryJournal>, settings: ThingSettings) -> ThingActor {
        let mut actor = actor(journal, settings);
        let mut ctx = ActorContext::new("thing_test".to_string());
        actor.on_start(&mut ctx).await;
        actor
    }

    fn create() -> Command {
        Command::new(
            id(),
            ThingCommand::CreateThing {
                thing: serde_json::from_value(json!({"attributes": {"room": "kitchen"}})).unwrap(),
            },
        )
    }

    fn set_room(room: &str) -> Command {
        Command::new(
            id(),
            ThingCommand::ModifyAttribute {
                pointer: "/room".to_string(),
                value: json!(room),
            },
        )
    }

    #[tokio::test]
    async fn test_create_then_modify() {
        let journal = Arc::new(InMemoryJournal::new());
        let mut thing = started(journal.clone(), ThingSettings::default()).await;

        let created = thing.process(create()).await.unwrap();
        assert_eq!(created.revision, Revision::new(1));
        assert_eq!(created.thing.unwrap().attributes["room"], json!("kitchen"));

        let modified = thing
            .process(set_room("hall").with_headers(Headers::new().expected_revision(Revision::new(1))))
            .await
            .unwrap();
        assert_eq!(modified.revision, Revision::new(2));
        assert!(modified.thing.is_none());

        let events = journal.load_events(&id(), Revision::ZERO).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_expected_revision_persists_nothing() {
        let journal = Arc::new(InMemoryJournal::new());
        let mut thing = started(journal.clone(), ThingSettings::default()).await;
        thing.process(create()).await.unwrap();

        let err = thing
            .process(set_room("hall").with_headers(Headers::new().expected_revision(Revision::new(7))))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "revision_mismatch");
        assert_eq!(journal.load_events(&id(), Revision::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_from_snapshot_and_tail() {
        let journal = Arc::new(InMemoryJournal::new());
        let settings = ThingSettings {
            snapshot_interval: 2,
            ..ThingSettings::default()
        };
        let mut thing = started(journal.clone(), settings.clone()).await;
        thing.process(create()).await.unwrap();
        thing.process(set_room("hall")).await.unwrap();
        thing.process(set_room("attic")).await.unwrap();

        let snapshot = journal.load_latest_snapshot(&id()).await.unwrap().unwrap();
        assert_eq!(snapshot.revision(), Revision::new(2));

        let recovered = started(journal, settings).await;
        let state = recovered.ready_state().unwrap();
        assert_eq!(state.revision, Revision::new(3));
        assert_eq!(state.thing().unwrap().attributes["room"], json!("attic"));
    }

    #[tokio::test]
    async fn test_unknown_event_kind_fails_context() {
        let journal = Arc::new(InMemoryJournal::new());
        journal
            .append(
                JournalEntry {
                    entity_id: id(),
                    revision: Revision::new(1),
                    event_type: "thing.teleported".to_string(),
                    occurred_at: chrono::Utc::now(),
                    correlation_id: "c".to_string(),
                    payload: json!({}),
                },
                Revision::ZERO,
            )
            .await
            .unwrap();

        let mut thing = started(journal, ThingSettings::default()).await;
        let err = thing.process(set_room("hall")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_deleted_thing_is_tombstone() {
        let journal = Arc::new(InMemoryJournal::new());
        let mut thing = started(journal, ThingSettings::default()).await;
        thing.process(create()).await.unwrap();
        let deleted = thing
            .process(Command::new(id(), ThingCommand::DeleteThing))
            .await
            .unwrap();
        assert_eq!(deleted.revision, Revision::new(2));

        let state = thing.ready_state().unwrap();
        assert_eq!(state.lifecycle, Lifecycle::Deleted);
        assert_eq!(state.revision, Revision::new(2));

        let err = thing
            .process(Command::new(id(), ThingCommand::RetrieveThing))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "thing_not_found");
    }

    #[tokio::test]
    async fn test_stopped_context_rejects_queued_commands_as_retryable() {
        let journal = Arc::new(InMemoryJournal::new());
        let (handle, actor_ref) = spawn(actor(journal, ThingSettings::default()), 8, None);
        actor_ref.stop();
        while actor_ref.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (reply, response) = oneshot::channel();
        let message = ThingMessage {
            command: create(),
            reply,
        };
        assert!(handle.send_or_return(message).await.is_err());
        assert!(response.await.is_err());

        let mut thing = actor(Arc::new(InMemoryJournal::new()), ThingSettings::default());
        let (reply, response) = oneshot::channel();
        thing.reject(ThingMessage {
            command: create(),
            reply,
        });
        let err = response.await.unwrap().unwrap_err();
        assert!(err.is_retryable());
    }
}

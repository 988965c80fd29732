//! Shared helpers for the things integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use twin_events::{JournalEntry, Snapshot, Thing};
use twin_id::{EntityId, Revision};
use twin_policy::CreationRestrictionConfig;
use twin_signals::{Command, Headers, ThingCommand};
use twin_things::actors::{BackoffPolicy, DispatcherSettings, RestartPolicy, ThingSettings};
use twin_things::journal::{InMemoryJournal, Journal, JournalError};
use twin_things::ThingsService;

pub const SUBJECT: &str = "nginx:alice";

/// In-memory journal with injectable faults.
#[derive(Default)]
pub struct TestJournal {
    inner: InMemoryJournal,
    read_failures: AtomicU32,
    snapshot_reads: AtomicU32,
    append_delay_ms: AtomicU64,
    panic_next_append: AtomicBool,
}

impl TestJournal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` snapshot or event reads fail as unavailable.
    pub fn fail_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Number of snapshot reads, one per recovery attempt.
    pub fn snapshot_reads(&self) -> u32 {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    pub fn delay_appends(&self, delay: Duration) {
        self.append_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn panic_on_next_append(&self) {
        self.panic_next_append.store(true, Ordering::SeqCst);
    }

    fn take_read_failure(&self) -> Result<(), JournalError> {
        let failed = self
            .read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(JournalError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Journal for TestJournal {
    async fn append(
        &self,
        entry: JournalEntry,
        expected_prior: Revision,
    ) -> Result<Revision, JournalError> {
        if self.panic_next_append.swap(false, Ordering::SeqCst) {
            panic!("injected append panic");
        }
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.append(entry, expected_prior).await
    }

    async fn load_events(
        &self,
        entity_id: &EntityId,
        after: Revision,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        self.take_read_failure()?;
        self.inner.load_events(entity_id, after).await
    }

    async fn load_latest_snapshot(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Snapshot>, JournalError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        self.take_read_failure()?;
        self.inner.load_latest_snapshot(entity_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), JournalError> {
        self.inner.save_snapshot(snapshot).await
    }

    async fn purge_namespace(&self, namespace: &str) -> Result<usize, JournalError> {
        self.inner.purge_namespace(namespace).await
    }
}

/// Settings with short delays so failure paths finish quickly.
pub fn fast_settings() -> DispatcherSettings {
    let backoff = BackoffPolicy {
        base: Duration::from_millis(5),
        max: Duration::from_millis(20),
        jitter: 0.0,
    };
    DispatcherSettings {
        ask_timeout: Duration::from_secs(5),
        idle_timeout: None,
        mailbox_size: 64,
        thing: ThingSettings {
            snapshot_interval: 10,
            recovery_attempts: 3,
            recovery_backoff: backoff.clone(),
        },
        restart_policy: RestartPolicy {
            max_restarts: 5,
            window: Duration::from_secs(60),
            backoff,
        },
    }
}

pub fn service(journal: Arc<dyn Journal>) -> ThingsService {
    service_with(journal, CreationRestrictionConfig::default(), fast_settings())
}

pub fn service_with(
    journal: Arc<dyn Journal>,
    rules: CreationRestrictionConfig,
    settings: DispatcherSettings,
) -> ThingsService {
    ThingsService::new(journal, rules, settings)
}

pub fn id(s: &str) -> EntityId {
    EntityId::parse(s).expect("valid entity id")
}

pub fn headers() -> Headers {
    Headers::new().auth_subject(SUBJECT)
}

pub fn command(entity_id: &str, payload: ThingCommand) -> Command {
    Command::new(id(entity_id), payload).with_headers(headers())
}

pub fn create(entity_id: &str) -> Command {
    create_thing(entity_id, Thing::default())
}

pub fn create_thing(entity_id: &str, thing: Thing) -> Command {
    command(entity_id, ThingCommand::CreateThing { thing })
}

pub fn retrieve(entity_id: &str) -> Command {
    command(entity_id, ThingCommand::RetrieveThing)
}

pub fn set_attribute(entity_id: &str, pointer: &str, value: serde_json::Value) -> Command {
    command(
        entity_id,
        ThingCommand::ModifyAttribute {
            pointer: pointer.to_string(),
            value,
        },
    )
}

/// Polls until `check` holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//! Core actor framework types and traits.
//!
//! Provides the building blocks the thing contexts run on:
//! - `Actor` trait for defining actor behavior
//! - `ActorHandle` for sending messages to actors
//! - `ActorRef` for stopping and observing a running actor
//! - Backoff and restart policies

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for an actor.
///
/// Actors:
/// - Process messages one at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Communicate only via message passing
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message. Returns `false` to stop the actor.
    async fn handle(&mut self, msg: Self::Message, ctx: &mut ActorContext) -> bool;

    /// Called when the actor starts (or restarts), before any message.
    async fn on_start(&mut self, _ctx: &mut ActorContext) {}

    /// Called when the actor is about to stop.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}

    /// Called for every message still queued when the actor stops without
    /// processing it.
    fn reject(&mut self, _msg: Self::Message) {}
}

/// Context provided to actors during message handling.
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Messages handled so far.
    pub messages_processed: u64,

    /// Current actor state (for introspection).
    pub state: ActorState,
}

impl ActorContext {
    pub fn new(actor_id: String) -> Self {
        Self {
            actor_id,
            messages_processed: 0,
            state: ActorState::Starting,
        }
    }
}

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Starting,
    Running,
    /// No message arrived within the idle timeout.
    Retiring,
    Stopping,
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Send a message, handing it back if the actor no longer accepts messages.
    pub async fn send_or_return(&self, msg: M) -> Result<(), M> {
        self.tx.send(msg).await.map_err(|e| e.0)
    }

    /// Returns true once the actor has closed or dropped its mailbox.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

/// Type-erased actor reference for supervision.
pub struct ActorRef {
    pub actor_id: String,

    task_handle: tokio::task::JoinHandle<()>,

    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if the actor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Abort the actor task immediately.
    pub fn abort(&self) {
        self.task_handle.abort();
    }
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter;
        let final_delay = (delay + rand_jitter(jitter_range)).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Jitter in `[-range, range]` from a time-seeded LCG.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = (seed.wrapping_mul(6364136223846793005).wrapping_add(1)) as f64;
    let normalized = (random / u64::MAX as f64) * 2.0 - 1.0;
    normalized * range
}

// =============================================================================
// Restart Policy
// =============================================================================

/// How often a crashed actor is restarted eagerly.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Maximum restart attempts within the window.
    pub max_restarts: u32,

    /// Time window for counting restarts.
    pub window: Duration,

    /// Delay before each restart.
    pub backoff: BackoffPolicy,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Restart timestamps of one actor identity, pruned to the policy window.
#[derive(Debug, Default)]
pub struct RestartHistory {
    timestamps: Vec<Instant>,
}

impl RestartHistory {
    /// Records a restart if the policy allows one.
    ///
    /// Returns the delay to apply before restarting, or `None` once the
    /// restart budget for the window is used up.
    pub fn admit(&mut self, policy: &RestartPolicy) -> Option<Duration> {
        let now = Instant::now();
        self.timestamps
            .retain(|t| now.duration_since(*t) < policy.window);

        if self.timestamps.len() >= policy.max_restarts as usize {
            return None;
        }

        let delay = policy.backoff.delay(self.timestamps.len() as u32);
        self.timestamps.push(now);
        Some(delay)
    }
}

// =============================================================================
// Spawning
// =============================================================================

/// Spawns an actor on its own task.
///
/// With an idle timeout the actor retires once no message has arrived for that
/// long. Whatever reaches the mailbox after the actor decided to stop is
/// rejected, never handled, so a replacement can start right away.
pub fn spawn<A: Actor>(
    actor: A,
    mailbox_size: usize,
    idle_timeout: Option<Duration>,
) -> (ActorHandle<A::Message>, ActorRef) {
    let actor_id = format!("{}_{}", actor.name(), generate_actor_id());
    let (tx, rx) = mpsc::channel(mailbox_size.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task_handle = tokio::spawn(run_actor_loop(
        actor,
        rx,
        shutdown_rx,
        actor_id.clone(),
        idle_timeout,
    ));

    debug!(actor_id = %actor_id, "Spawned actor");

    let actor_ref = ActorRef {
        actor_id: actor_id.clone(),
        task_handle,
        shutdown_tx,
    };

    (ActorHandle { tx, actor_id }, actor_ref)
}

// =============================================================================
// Actor Loop
// =============================================================================

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending::<()>().await,
    }
}

/// Closes the mailbox and rejects everything still in it.
///
/// Returns the number of rejected messages.
async fn close_and_reject<A: Actor>(actor: &mut A, rx: &mut mpsc::Receiver<A::Message>) -> usize {
    rx.close();
    let mut rejected = 0;
    while let Some(msg) = rx.recv().await {
        actor.reject(msg);
        rejected += 1;
    }
    rejected
}

/// Run the main actor loop.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
    idle_timeout: Option<Duration>,
) {
    let mut ctx = ActorContext::new(actor_id.clone());

    actor.on_start(&mut ctx).await;
    ctx.state = ActorState::Running;
    debug!(actor_id = %actor_id, "Actor started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // A dropped sender means the owning ActorRef is gone.
                if changed.is_err() || *shutdown.borrow() {
                    debug!(actor_id = %actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %actor_id, "Actor mailbox closed");
                    break;
                };

                ctx.messages_processed += 1;
                if !actor.handle(msg, &mut ctx).await {
                    info!(actor_id = %actor_id, "Actor requested stop");
                    break;
                }
            }

            _ = idle(idle_timeout) => {
                debug!(actor_id = %actor_id, "Actor idle, retiring");
                ctx.state = ActorState::Retiring;
                break;
            }
        }
    }

    let rejected = close_and_reject(&mut actor, &mut rx).await;
    if rejected > 0 {
        debug!(actor_id = %actor_id, rejected, "Rejected queued messages");
    }

    if ctx.state == ActorState::Running {
        ctx.state = ActorState::Stopping;
    }
    actor.on_stop(&mut ctx).await;

    debug!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

// =============================================================================
// Helpers
// =============================================================================

static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_actor_id() -> u64 {
    ACTOR_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================

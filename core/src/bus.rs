// Event bus implementation
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use crate::barrier::{BarrierConfig, BarrierCoordinator, BarrierId, BarrierState};
use crate::envelope::{keys, structure_error, EventEnvelope};
use crate::pattern::BatchEventPatternMatcher;
use crate::priority::{default_metadata, priority_score};
use crate::retry::{with_retry, RetryAttempt, RetryLogger, RetryPolicy, TracingRetryLogger};
use crate::tier::{tier_for_event_type, tier_label, Tier};
use crate::{BusError, Result};

/// Event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventEnvelope) -> Result<()>;
}

/// Adapts a closure returning a future into an [`EventHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    async fn handle(&self, event: EventEnvelope) -> Result<()> {
        (self.0)(event).await
    }
}

/// Subscription lifecycle: registered until the first matching event arrives,
/// active afterwards. Removal is always explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Registered,
    Active,
}

/// Per-subscription dispatch settings.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Retry policy wrapping every handler invocation
    pub retry_policy: RetryPolicy,
    /// Capacity of the subscriber's delivery queue
    pub queue_capacity: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            queue_capacity: 1024,
        }
    }
}

/// Subscription information
struct Subscription {
    id: String,
    seq: u64,
    matcher: BatchEventPatternMatcher,
    sender: mpsc::Sender<EventEnvelope>,
    active: AtomicBool,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    /// Subscriptions whose patterns matched at publish time
    pub matched: usize,
    pub tier: Option<Tier>,
    pub score: u32,
}

/// Per-tier dispatch statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub failed_handlers: u64,
    pub retry_attempts: u64,
    pub active_subscriptions: usize,
}

/// An event waiting in the dispatch queue. Higher scores dispatch first;
/// equal scores keep publish order.
struct PendingEvent {
    score: u32,
    seq: u64,
    event: EventEnvelope,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq == other.seq
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Event bus core implementation.
///
/// Owns the subscription registry, the priority-ordered dispatch queue, and
/// the barrier coordinator. Dispatch only reads the registry; subscribe and
/// unsubscribe are the only mutators.
pub struct EventBus {
    // Subscription id -> subscription
    subscriptions: Arc<DashMap<String, Subscription>>,

    barriers: Arc<BarrierCoordinator>,

    // Pending events, highest priority score first
    queue: Arc<Mutex<BinaryHeap<PendingEvent>>>,
    queue_notify: Arc<Notify>,

    // Statistics keyed by tier label
    stats: Arc<DashMap<String, BusStats>>,

    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    sub_seq: AtomicU64,
    pub_seq: AtomicU64,
}

impl EventBus {
    pub async fn new() -> Result<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            subscriptions: Arc::new(DashMap::new()),
            barriers: Arc::new(BarrierCoordinator::new()),
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            queue_notify: Arc::new(Notify::new()),
            stats: Arc::new(DashMap::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
            sub_seq: AtomicU64::new(0),
            pub_seq: AtomicU64::new(0),
        })
    }

    /// Starts the dispatch loop. Events published before start stay queued.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let subscriptions = Arc::clone(&self.subscriptions);
        let barriers = Arc::clone(&self.barriers);
        let queue = Arc::clone(&self.queue);
        let notify = Arc::clone(&self.queue_notify);
        let stats = Arc::clone(&self.stats);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                // Drain everything currently queued, highest score first. The
                // queue lock is released before any delivery await.
                loop {
                    let pending = lock_queue(&queue).pop();
                    let Some(pending) = pending else { break };
                    dispatch_event(&subscriptions, &stats, &barriers, pending.event).await;
                }

                tokio::select! {
                    _ = notify.notified() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("event bus dispatcher stopped");
        });

        info!("Event bus started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Event bus shutting down");
        let _ = self.shutdown_tx.send(true);
        self.subscriptions.clear();
        Ok(())
    }

    /// Registers a handler for a set of topic patterns.
    pub fn subscribe(
        &self,
        patterns: Vec<String>,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<String> {
        if patterns.is_empty() {
            return Err(BusError::Subscription(
                "at least one pattern is required".to_string(),
            ));
        }

        let seq = self.sub_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("sub-{seq}");
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));

        self.subscriptions.insert(
            id.clone(),
            Subscription {
                id: id.clone(),
                seq,
                matcher: BatchEventPatternMatcher::new(patterns),
                sender: tx,
                active: AtomicBool::new(false),
            },
        );

        spawn_subscription_worker(
            id.clone(),
            rx,
            handler,
            options.retry_policy,
            Arc::clone(&self.stats),
        );

        info!(subscription = %id, "subscription registered");
        Ok(id)
    }

    /// Removes a subscription; its worker drains and stops.
    pub fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        if self.subscriptions.remove(subscription_id).is_none() {
            return Err(BusError::Subscription(format!(
                "unknown subscription {subscription_id}"
            )));
        }
        info!(subscription = %subscription_id, "unsubscribed");
        Ok(())
    }

    pub fn subscription_state(&self, subscription_id: &str) -> Option<SubscriptionState> {
        self.subscriptions.get(subscription_id).map(|sub| {
            if sub.active.load(Ordering::Relaxed) {
                SubscriptionState::Active
            } else {
                SubscriptionState::Registered
            }
        })
    }

    /// Validates, classifies and queues an event for dispatch.
    ///
    /// Producer-supplied metadata is kept as-is; absent metadata is filled
    /// from the event type's default classification.
    pub async fn publish(&self, mut event: EventEnvelope) -> Result<PublishReceipt> {
        if event.id.is_empty() {
            return Err(BusError::Validation(
                "field `id` must be non-empty".to_string(),
            ));
        }

        if event.metadata.is_none() {
            event.metadata = Some(default_metadata(&event.event_type));
        }

        let tier = tier_for_event_type(&event.event_type);
        let score = priority_score(&event);
        let matched = self
            .subscriptions
            .iter()
            .filter(|sub| sub.matcher.matches(&event.event_type))
            .count();

        update_stats(&self.stats, tier_label(&event.event_type), |s| {
            s.total_published += 1;
        });

        let seq = self.pub_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = %event.id,
            event_type = %event.event_type,
            score,
            "event queued for dispatch"
        );
        lock_queue(&self.queue).push(PendingEvent { score, seq, event });
        self.queue_notify.notify_one();

        Ok(PublishReceipt {
            matched,
            tier,
            score,
        })
    }

    /// Boundary entry for untrusted wire values: structurally validates the
    /// candidate and rejects invalid input before any handler sees it.
    pub async fn publish_raw(&self, value: Value) -> Result<PublishReceipt> {
        if let Some(problem) = structure_error(&value) {
            return Err(BusError::Validation(problem));
        }
        let event = EventEnvelope::from_value(value)?;
        self.publish(event).await
    }

    // Barrier operations, delegated to the coordinator

    pub fn open_barrier(&self, config: BarrierConfig) -> BarrierId {
        self.barriers.open(config)
    }

    pub fn acknowledge_barrier(&self, id: &str, responder: &str) -> Result<BarrierState> {
        self.barriers.acknowledge(id, responder)
    }

    pub fn close_barrier(&self, id: &str) -> Result<BarrierState> {
        self.barriers.close(id)
    }

    pub fn barrier_status(&self, id: &str) -> Option<BarrierState> {
        self.barriers.status(id)
    }

    pub async fn wait_barrier(&self, id: &str) -> Result<BarrierState> {
        self.barriers.wait(id).await
    }

    /// Stats snapshot for a tier label (`"1"`, `"safety"`, `"unclassified"`, ...).
    pub fn stats(&self, tier: &str) -> Option<BusStats> {
        self.stats.get(tier).map(|entry| {
            let mut snapshot = entry.clone();
            snapshot.active_subscriptions = self.subscriptions.len();
            snapshot
        })
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

fn lock_queue(queue: &Mutex<BinaryHeap<PendingEvent>>) -> MutexGuard<'_, BinaryHeap<PendingEvent>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn update_stats<F>(stats: &DashMap<String, BusStats>, key: &str, f: F)
where
    F: FnOnce(&mut BusStats),
{
    let mut entry = stats.entry(key.to_string()).or_default();
    f(entry.value_mut());
}

/// Counts retry attempts into the tier's stats before logging them.
struct StatsRetryLogger {
    stats: Arc<DashMap<String, BusStats>>,
    key: &'static str,
}

impl RetryLogger for StatsRetryLogger {
    fn warn(&self, message: &str, attempt: &RetryAttempt) {
        update_stats(&self.stats, self.key, |s| s.retry_attempts += 1);
        TracingRetryLogger.warn(message, attempt);
    }
}

/// One worker per subscription consumes its queue serially: FIFO per
/// subscriber, and never two concurrent deliveries of the same event to the
/// same handler. Handler panics are contained and normalized.
fn spawn_subscription_worker(
    subscription_id: String,
    mut rx: mpsc::Receiver<EventEnvelope>,
    handler: Arc<dyn EventHandler>,
    policy: RetryPolicy,
    stats: Arc<DashMap<String, BusStats>>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let key = tier_label(&event.event_type);
            let logger = StatsRetryLogger {
                stats: Arc::clone(&stats),
                key,
            };

            let result = with_retry(
                || {
                    let handler = Arc::clone(&handler);
                    let event = event.clone();
                    async move {
                        match tokio::spawn(async move { handler.handle(event).await }).await {
                            Ok(outcome) => outcome,
                            Err(join_error) => Err(BusError::UnknownFailure(format!(
                                "handler panicked: {join_error}"
                            ))),
                        }
                    }
                },
                &policy,
                &logger,
            )
            .await;

            if let Err(error) = result {
                warn!(
                    subscription = %subscription_id,
                    event = %event.id,
                    error = %error,
                    "handler failed permanently"
                );
                update_stats(&stats, key, |s| s.failed_handlers += 1);
            }
        }
        debug!(subscription = %subscription_id, "subscription worker stopped");
    });
}

async fn dispatch_event(
    subscriptions: &DashMap<String, Subscription>,
    stats: &DashMap<String, BusStats>,
    barriers: &BarrierCoordinator,
    event: EventEnvelope,
) {
    // Barrier acknowledgment piggybacked on event metadata
    if let (Some(barrier_id), Some(responder)) = (
        event.metadata_str(keys::BARRIER_ID),
        event.metadata_str(keys::RESPONDER),
    ) {
        match barriers.acknowledge(barrier_id, responder) {
            Ok(state) => {
                debug!(barrier = %barrier_id, state = ?state, "barrier acknowledged via event")
            }
            Err(error) => {
                debug!(barrier = %barrier_id, error = %error, "barrier acknowledgment ignored")
            }
        }
    }

    // Handlers of the same event run in subscription-registration order
    let mut matched: Vec<(u64, String, mpsc::Sender<EventEnvelope>)> = subscriptions
        .iter()
        .filter(|sub| sub.matcher.matches(&event.event_type))
        .map(|sub| {
            sub.active.store(true, Ordering::Relaxed);
            (sub.seq, sub.id.clone(), sub.sender.clone())
        })
        .collect();
    matched.sort_by_key(|(seq, ..)| *seq);

    let key = tier_label(&event.event_type);
    let mut delivered = 0u64;
    for (_, sub_id, sender) in matched {
        if sender.send(event.clone()).await.is_ok() {
            delivered += 1;
        } else {
            warn!(
                subscription = %sub_id,
                event = %event.id,
                "subscriber queue closed, dropping delivery"
            );
        }
    }
    update_stats(stats, key, |s| s.total_delivered += delivered);
}

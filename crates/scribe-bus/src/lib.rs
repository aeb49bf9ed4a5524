//! Typed publish/subscribe event bus with per-subscriber dispatch.
//!
//! The bus maps an event type to an ordered list of subscribers. Every
//! subscription owns a bounded queue and a dedicated worker task, which gives
//! the delivery contract its shape:
//!
//! - **Per-subscriber FIFO**: one worker drains one queue in order.
//! - **Concurrent fan-out**: different subscribers' workers run independently;
//!   no ordering is promised between them.
//! - **Publisher isolation**: [`EventBus::publish`] only assigns a sequence
//!   number and enqueues. Handler errors and panics are caught in the worker
//!   and logged and counted; they never reach the publisher.
//! - **Bounded queues, drop-oldest**: when a subscriber's queue is full the
//!   oldest unprocessed event is dropped and counted against that plugin.
//!
//! There is no durability: events are lost on process exit.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scribe_core::{BusEvent, SharedHandler};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ─── Subscription handle ─────────────────────────────────────────────────────

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ─── Delivery metrics ────────────────────────────────────────────────────────

/// Per-plugin delivery counters, aggregated across all of its subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events handed to the plugin's handlers successfully.
    pub delivered: u64,
    /// Events discarded because the subscriber's queue was full.
    pub dropped: u64,
    /// Handler invocations that returned an error or panicked.
    pub failed: u64,
}

#[derive(Default)]
struct MetricsInner {
    per_plugin: HashMap<String, DeliveryStats>,
}

struct Metrics {
    inner: Mutex<MetricsInner>,
}

impl Metrics {
    fn record_delivered(&self, plugin_id: &str) {
        self.inner
            .lock()
            .per_plugin
            .entry(plugin_id.to_string())
            .or_default()
            .delivered += 1;
    }

    fn record_dropped(&self, plugin_id: &str) {
        self.inner
            .lock()
            .per_plugin
            .entry(plugin_id.to_string())
            .or_default()
            .dropped += 1;
    }

    fn record_failed(&self, plugin_id: &str) {
        self.inner
            .lock()
            .per_plugin
            .entry(plugin_id.to_string())
            .or_default()
            .failed += 1;
    }
}

// ─── Subscriber internals ────────────────────────────────────────────────────

/// Bounded event queue shared between the publisher and one worker.
struct SubscriberQueue {
    events: Mutex<VecDeque<BusEvent>>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues an event, dropping the oldest queued one when full.
    /// Returns `true` if an old event was dropped.
    fn push(&self, event: BusEvent) -> bool {
        let dropped = {
            let mut q = self.events.lock();
            let dropped = if q.len() >= self.capacity {
                q.pop_front();
                true
            } else {
                false
            };
            q.push_back(event);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    fn pop(&self) -> Option<BusEvent> {
        self.events.lock().pop_front()
    }
}

struct Subscriber {
    id: SubscriptionId,
    plugin_id: String,
    queue: Arc<SubscriberQueue>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

// ─── EventBus ────────────────────────────────────────────────────────────────

/// The event bus.
///
/// Cheap to share: wrap in an `Arc` and clone the handle. All mutation goes
/// through short critical sections; publish never holds a lock across handler
/// invocation (handlers run in the subscribers' workers).
pub struct EventBus {
    /// event type → subscribers in subscription order.
    subscribers: RwLock<HashMap<String, Vec<Arc<Subscriber>>>>,
    sequence: AtomicU64,
    next_id: AtomicU64,
    queue_capacity: usize,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl EventBus {
    /// Creates a bus with the default queue capacity.
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a bus with a custom per-subscriber queue capacity.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            queue_capacity: capacity.max(1),
            metrics: Arc::new(Metrics {
                inner: Mutex::new(MetricsInner::default()),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribes `plugin_id`'s handler to `event_type`.
    ///
    /// Spawns the subscription's worker task; the returned handle is the only
    /// way to remove this specific subscription.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        plugin_id: impl Into<String>,
        handler: SharedHandler,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let plugin_id = plugin_id.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let queue = Arc::new(SubscriberQueue::new(self.queue_capacity));
        let cancel = self.cancel.child_token();
        let worker = tokio::spawn(run_worker(
            plugin_id.clone(),
            Arc::clone(&queue),
            handler,
            Arc::clone(&self.metrics),
            cancel.clone(),
        ));

        let subscriber = Arc::new(Subscriber {
            id,
            plugin_id: plugin_id.clone(),
            queue,
            cancel,
            worker: Mutex::new(Some(worker)),
        });

        self.subscribers
            .write()
            .entry(event_type.clone())
            .or_default()
            .push(subscriber);

        debug!(plugin = %plugin_id, event_type = %event_type, "Subscribed");
        id
    }

    /// Removes the subscription identified by `id`. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = {
            let mut map = self.subscribers.write();
            let mut removed = None;
            for subs in map.values_mut() {
                if let Some(pos) = subs.iter().position(|s| s.id == id) {
                    removed = Some(subs.remove(pos));
                    break;
                }
            }
            map.retain(|_, subs| !subs.is_empty());
            removed
        };

        if let Some(sub) = removed {
            sub.cancel.cancel();
            debug!(plugin = %sub.plugin_id, "Unsubscribed");
        }
    }

    /// Removes every subscription owned by `plugin_id`.
    ///
    /// Used on plugin stop and uninstall so no residual subscriptions outlive
    /// a stopped plugin.
    pub fn unsubscribe_all(&self, plugin_id: &str) {
        let removed: Vec<Arc<Subscriber>> = {
            let mut map = self.subscribers.write();
            let mut removed = Vec::new();
            for subs in map.values_mut() {
                subs.retain(|s| {
                    if s.plugin_id == plugin_id {
                        removed.push(Arc::clone(s));
                        false
                    } else {
                        true
                    }
                });
            }
            map.retain(|_, subs| !subs.is_empty());
            removed
        };

        for sub in &removed {
            sub.cancel.cancel();
        }
        if !removed.is_empty() {
            let stats = self.stats(plugin_id);
            info!(
                plugin = %plugin_id,
                subscriptions = removed.len(),
                delivered = stats.delivered,
                dropped = stats.dropped,
                failed = stats.failed,
                "Removed all subscriptions"
            );
        }
    }

    /// Publishes an event to every current subscriber of its type.
    ///
    /// Assigns and returns the event's sequence number. Never blocks beyond
    /// enqueueing; publishing with no subscribers succeeds with no effect.
    pub fn publish(&self, mut event: BusEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        event.sequence = sequence;

        // Snapshot under the read lock; enqueue after releasing it.
        let targets: Vec<Arc<Subscriber>> = {
            let map = self.subscribers.read();
            map.get(&event.event_type).cloned().unwrap_or_default()
        };

        for sub in targets {
            if sub.queue.push(event.clone()) {
                self.metrics.record_dropped(&sub.plugin_id);
                warn!(
                    plugin = %sub.plugin_id,
                    event_type = %event.event_type,
                    "Subscriber queue full, dropped oldest event"
                );
            }
        }
        sequence
    }

    /// Delivery counters for `plugin_id` (zeroes for unknown plugins).
    pub fn stats(&self, plugin_id: &str) -> DeliveryStats {
        self.metrics
            .inner
            .lock()
            .per_plugin
            .get(plugin_id)
            .copied()
            .unwrap_or_default()
    }

    /// Number of live subscriptions across all event types.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }

    /// Cancels all workers and waits for them to drain, up to `deadline`.
    pub async fn shutdown(&self, deadline: Duration) {
        self.cancel.cancel();
        let workers: Vec<JoinHandle<()>> = {
            let mut map = self.subscribers.write();
            let workers = map
                .values_mut()
                .flat_map(|subs| subs.iter_mut().filter_map(|s| s.worker.lock().take()))
                .collect();
            map.clear();
            workers
        };

        let join_all = async {
            for w in workers {
                let _ = w.await;
            }
        };
        if tokio::time::timeout(deadline, join_all).await.is_err() {
            warn!("Event bus shutdown deadline exceeded; abandoning workers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// Drains one subscriber's queue, invoking the handler per event.
///
/// On cancellation the remaining queue is drained once, then the worker exits.
async fn run_worker(
    plugin_id: String,
    queue: Arc<SubscriberQueue>,
    handler: SharedHandler,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                while let Some(event) = queue.pop() {
                    deliver(&plugin_id, &handler, event, &metrics).await;
                }
                return;
            }
            _ = queue.notify.notified() => {
                while let Some(event) = queue.pop() {
                    deliver(&plugin_id, &handler, event, &metrics).await;
                }
            }
        }
    }
}

/// Invokes the handler for one event, containing errors and panics.
async fn deliver(
    plugin_id: &str,
    handler: &SharedHandler,
    event: BusEvent,
    metrics: &Metrics,
) {
    let event_type = event.event_type.clone();
    let sequence = event.sequence;
    let outcome = std::panic::AssertUnwindSafe(handler.on_event(event))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => metrics.record_delivered(plugin_id),
        Ok(Err(e)) => {
            metrics.record_failed(plugin_id);
            warn!(
                plugin = %plugin_id,
                event_type = %event_type,
                sequence,
                error = %e,
                "Event handler returned an error"
            );
        }
        Err(_) => {
            metrics.record_failed(plugin_id);
            error!(
                plugin = %plugin_id,
                event_type = %event_type,
                sequence,
                "Event handler panicked"
            );
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use scribe_core::{EventHandler, PluginError, PluginResult};

    /// Records received sequence numbers.
    struct Recorder {
        seen: Mutex<Vec<u64>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        async fn wait_for(&self, count: usize) {
            for _ in 0..500 {
                if self.seen.lock().len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("timed out waiting for {count} events");
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn on_event(&self, event: BusEvent) -> PluginResult<()> {
            self.seen.lock().push(event.sequence);
            Ok(())
        }
    }

    /// Always fails.
    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn on_event(&self, _event: BusEvent) -> PluginResult<()> {
            Err(PluginError::internal("boom"))
        }
    }

    fn event(event_type: &str) -> BusEvent {
        BusEvent::system(event_type, serde_json::json!({}))
    }

    #[tokio::test]
    async fn fanout_preserves_per_subscriber_order() {
        let bus = EventBus::new();
        let a = Recorder::new();
        let b = Recorder::new();
        bus.subscribe("note.created", "plugin-a", a.clone());
        bus.subscribe("note.created", "plugin-b", b.clone());

        let s1 = bus.publish(event("note.created"));
        let s2 = bus.publish(event("note.created"));
        let s3 = bus.publish(event("note.created"));

        a.wait_for(3).await;
        b.wait_for(3).await;

        assert_eq!(*a.seen.lock(), vec![s1, s2, s3]);
        assert_eq!(*b.seen.lock(), vec![s1, s2, s3]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = EventBus::new();
        let seq = bus.publish(event("note.deleted"));
        assert!(seq > 0);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_other_subscribers() {
        let bus = EventBus::new();
        let ok = Recorder::new();
        bus.subscribe("note.updated", "plugin-a", Arc::new(Failing));
        bus.subscribe("note.updated", "plugin-b", ok.clone());

        bus.publish(event("note.updated"));
        ok.wait_for(1).await;

        for _ in 0..500 {
            if bus.stats("plugin-a").failed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.stats("plugin-a").failed, 1);
        assert_eq!(bus.stats("plugin-b").delivered, 1);
    }

    #[tokio::test]
    async fn unsubscribe_restores_prior_subscriber_set() {
        let bus = EventBus::new();
        let a = Recorder::new();
        assert_eq!(bus.subscription_count(), 0);

        let id = bus.subscribe("note.created", "plugin-a", a.clone());
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe(id);
        assert_eq!(bus.subscription_count(), 0);

        // Idempotent.
        bus.unsubscribe(id);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_removes_every_subscription_for_plugin() {
        let bus = EventBus::new();
        let a = Recorder::new();
        bus.subscribe("note.created", "plugin-a", a.clone());
        bus.subscribe("note.updated", "plugin-a", a.clone());
        bus.subscribe("note.created", "plugin-b", a.clone());

        bus.unsubscribe_all("plugin-a");
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        // Capacity 1: the second un-consumed publish evicts the first.
        let bus = EventBus::with_queue_capacity(1);

        // A handler that blocks until released so the queue stays occupied.
        struct Gated {
            release: tokio::sync::Semaphore,
            seen: Mutex<Vec<u64>>,
        }

        #[async_trait]
        impl EventHandler for Gated {
            async fn on_event(&self, event: BusEvent) -> PluginResult<()> {
                let permit = self.release.acquire().await.unwrap();
                permit.forget();
                self.seen.lock().push(event.sequence);
                Ok(())
            }
        }

        let gated = Arc::new(Gated {
            release: tokio::sync::Semaphore::new(0),
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe("note.created", "plugin-a", gated.clone());

        let s1 = bus.publish(event("note.created"));
        // Wait until the worker has picked up s1 and is blocked in the handler,
        // leaving the queue empty.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _s2 = bus.publish(event("note.created"));
        let s3 = bus.publish(event("note.created"));

        // Release deliveries; s2 should have been evicted by s3.
        gated.release.add_permits(3);
        for _ in 0..500 {
            if gated.seen.lock().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(*gated.seen.lock(), vec![s1, s3]);
        assert_eq!(bus.stats("plugin-a").dropped, 1);
    }
}

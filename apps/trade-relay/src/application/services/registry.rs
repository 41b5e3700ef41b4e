//! Subscriber Registry
//!
//! Tracks the live set of push-transport subscribers. Each subscriber owns
//! a bounded outbound queue and a writer task that drains it into the
//! connection, so log consumption never waits on a network write.
//!
//! # Concurrency
//!
//! The map is guarded by a `parking_lot::RwLock` held only for insert,
//! remove and the snapshot copy. Delivery I/O never runs under the lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::PushSink;
use crate::domain::streaming::Payload;
use crate::domain::subscription::{DisconnectReason, StateCell, SubscriberId, SubscriberState};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Per-subscriber delivery limits.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Capacity of each subscriber's outbound queue.
    pub queue_capacity: usize,
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Errors from enqueueing a frame for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber is not keeping up.
    #[error("outbound queue full")]
    QueueFull,

    /// The writer has already stopped.
    #[error("outbound queue closed")]
    QueueClosed,
}

impl DeliveryError {
    /// Disconnect reason for this failure.
    #[must_use]
    pub const fn reason(self) -> DisconnectReason {
        match self {
            Self::QueueFull => DisconnectReason::QueueFull,
            Self::QueueClosed => DisconnectReason::QueueClosed,
        }
    }
}

/// Handle to one live connection, owned by the registry.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    state: StateCell,
    outbound: mpsc::Sender<Payload>,
    closed: CancellationToken,
    connected_at: Instant,
}

impl Subscriber {
    /// Subscriber id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }

    /// Whether frames may still be enqueued.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SubscriberState::Open
    }

    /// Time since registration.
    #[must_use]
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Number of frames waiting in the outbound queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }

    /// Enqueue a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the queue is full or the writer is gone.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::QueueClosed,
        })
    }
}

/// Returned by [`SubscriberRegistry::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    id: SubscriberId,
    closed: CancellationToken,
}

impl Registration {
    /// Id assigned to the subscriber.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Resolves once the subscriber has been removed from the registry.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Whether the subscriber has been removed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Live set of open subscribers.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(SubscriberRegistry::new(RegistryConfig::default()));
/// let registration = registry.register(sink);
///
/// for subscriber in registry.snapshot() {
///     let _ = subscriber.try_enqueue(payload.clone());
/// }
///
/// registry.deregister(registration.id());
/// ```
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: RwLock<BTreeMap<SubscriberId, Arc<Subscriber>>>,
    next_id: AtomicU64,
    config: RegistryConfig,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            config,
        }
    }

    /// Delivery limits applied to new subscribers.
    #[must_use]
    pub const fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Register a newly upgraded connection in state `open`.
    ///
    /// Spawns the subscriber's writer task, so this must be called from
    /// within a Tokio runtime.
    pub fn register<S: PushSink>(self: &Arc<Self>, sink: S) -> Registration {
        let id = SubscriberId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (outbound, rx) = mpsc::channel(self.config.queue_capacity.max(1));

        let subscriber = Arc::new(Subscriber {
            id,
            state: StateCell::default(),
            outbound,
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
        });
        subscriber.state.advance(SubscriberState::Open);

        let registration = Registration {
            id,
            closed: subscriber.closed.clone(),
        };

        let open = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, Arc::clone(&subscriber));
            subscribers.len()
        };
        metrics::set_open_subscribers(open);
        tracing::debug!(subscriber = %id, open, "Subscriber registered");

        tokio::spawn(run_writer(
            Arc::downgrade(self),
            subscriber,
            rx,
            sink,
            self.config.send_timeout,
        ));

        registration
    }

    /// Remove a subscriber whose connection has closed.
    ///
    /// Idempotent. Returns `true` if the subscriber was present.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        self.disconnect(id, DisconnectReason::ClientClosed)
    }

    /// Remove a subscriber, recording why.
    ///
    /// Idempotent. Returns `true` if the subscriber was present.
    pub fn disconnect(&self, id: SubscriberId, reason: DisconnectReason) -> bool {
        let (removed, open) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        let Some(subscriber) = removed else {
            return false;
        };

        subscriber.state.advance(SubscriberState::Closing);
        subscriber.closed.cancel();

        metrics::set_open_subscribers(open);
        metrics::record_disconnect(reason);
        tracing::debug!(
            subscriber = %id,
            reason = reason.as_str(),
            connected_ms = subscriber.connected_for().as_millis(),
            open,
            "Subscriber removed"
        );
        true
    }

    /// Remove every subscriber. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.subscribers.write());
        metrics::set_open_subscribers(0);

        for subscriber in drained.values() {
            subscriber.state.advance(SubscriberState::Closing);
            subscriber.closed.cancel();
            metrics::record_disconnect(DisconnectReason::Shutdown);
        }
        drained.len()
    }

    /// Point-in-time copy of the live set, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().values().cloned().collect()
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Number of open subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

// =============================================================================
// Writer Task
// =============================================================================

/// Drain one subscriber's queue into its connection until removed or failed.
async fn run_writer<S: PushSink>(
    registry: Weak<SubscriberRegistry>,
    subscriber: Arc<Subscriber>,
    mut queue: mpsc::Receiver<Payload>,
    mut sink: S,
    send_timeout: Duration,
) {
    let id = subscriber.id;

    let failure = loop {
        let payload = tokio::select! {
            biased;
            () = subscriber.closed.cancelled() => break None,
            next = queue.recv() => match next {
                Some(payload) => payload,
                None => break None,
            },
        };

        let write = tokio::select! {
            biased;
            () = subscriber.closed.cancelled() => break None,
            result = tokio::time::timeout(send_timeout, sink.send_frame(&payload)) => result,
        };

        match write {
            Ok(Ok(())) => metrics::record_frame_sent(),
            Ok(Err(e)) => {
                tracing::debug!(subscriber = %id, error = %e, "Frame write failed");
                break Some(DisconnectReason::WriteFailed);
            }
            Err(_) => {
                tracing::debug!(
                    subscriber = %id,
                    timeout_ms = send_timeout.as_millis(),
                    "Frame write timed out"
                );
                break Some(DisconnectReason::SendTimeout);
            }
        }
    };

    if let Some(reason) = failure
        && let Some(registry) = registry.upgrade()
    {
        registry.disconnect(id, reason);
    }

    queue.close();
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
    subscriber.state.advance(SubscriberState::Closed);
    tracing::trace!(subscriber = %id, "Subscriber writer stopped");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::application::ports::SinkError;

    /// Sink that forwards frames to a channel the test reads.
    struct ChannelSink(mpsc::UnboundedSender<Payload>);

    #[async_trait]
    impl PushSink for ChannelSink {
        async fn send_frame(&mut self, payload: &Payload) -> Result<(), SinkError> {
            self.0.send(payload.clone()).map_err(|_| SinkError::Closed)
        }

        async fn close(&mut self) {}
    }

    /// Sink whose writes never complete.
    struct StalledSink;

    #[async_trait]
    impl PushSink for StalledSink {
        async fn send_frame(&mut self, _payload: &Payload) -> Result<(), SinkError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    /// Sink whose writes always fail.
    struct BrokenSink;

    #[async_trait]
    impl PushSink for BrokenSink {
        async fn send_frame(&mut self, _payload: &Payload) -> Result<(), SinkError> {
            Err(SinkError::Transport("broken pipe".to_string()))
        }

        async fn close(&mut self) {}
    }

    fn channel_sink() -> (ChannelSink, UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink(tx), rx)
    }

    fn registry_with(queue_capacity: usize, send_timeout: Duration) -> Arc<SubscriberRegistry> {
        Arc::new(SubscriberRegistry::new(RegistryConfig {
            queue_capacity,
            send_timeout,
        }))
    }

    #[tokio::test]
    async fn register_adds_open_subscriber() {
        let registry = Arc::new(SubscriberRegistry::default());
        let (sink, _rx) = channel_sink();

        let registration = registry.register(sink);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(registration.id()));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].state(), SubscriberState::Open);
        assert!(!registration.is_closed());
    }

    #[tokio::test]
    async fn ids_are_unique_and_snapshot_is_ordered() {
        let registry = Arc::new(SubscriberRegistry::default());
        let ids: Vec<_> = (0..5)
            .map(|_| registry.register(channel_sink().0).id())
            .collect();

        let snapshot_ids: Vec<_> = registry.snapshot().iter().map(|s| s.id()).collect();
        assert_eq!(snapshot_ids, ids);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let registry = Arc::new(SubscriberRegistry::default());
        let registration = registry.register(channel_sink().0);

        assert!(registry.deregister(registration.id()));
        assert!(!registry.deregister(registration.id()));
        assert!(!registry.deregister(SubscriberId::new(999)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn deregister_resolves_registration_and_closes_subscriber() {
        let registry = Arc::new(SubscriberRegistry::default());
        let registration = registry.register(channel_sink().0);
        let subscriber = Arc::clone(&registry.snapshot()[0]);

        registry.deregister(registration.id());

        tokio::time::timeout(Duration::from_secs(1), registration.closed())
            .await
            .unwrap();
        assert!(!subscriber.is_open());

        // Writer eventually reports closed
        tokio::time::timeout(Duration::from_secs(1), async {
            while subscriber.state() != SubscriberState::Closed {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn enqueued_frames_reach_sink_in_order() {
        let registry = Arc::new(SubscriberRegistry::default());
        let (sink, mut rx) = channel_sink();
        registry.register(sink);
        let subscriber = Arc::clone(&registry.snapshot()[0]);

        for i in 0..10 {
            subscriber.try_enqueue(Payload::from(format!("m{i}"))).unwrap();
        }

        for i in 0..10 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.as_text().unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let registry = registry_with(2, Duration::from_secs(60));
        registry.register(StalledSink);
        let subscriber = Arc::clone(&registry.snapshot()[0]);

        // One frame may be taken by the stalled writer; the queue then fills.
        let mut result = Ok(());
        for _ in 0..4 {
            result = subscriber.try_enqueue(Payload::from("x"));
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(DeliveryError::QueueFull));
    }

    #[tokio::test]
    async fn send_timeout_removes_subscriber() {
        let registry = registry_with(4, Duration::from_millis(20));
        let registration = registry.register(StalledSink);
        let subscriber = Arc::clone(&registry.snapshot()[0]);

        subscriber.try_enqueue(Payload::from("x")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), registration.closed())
            .await
            .unwrap();
        assert!(!registry.contains(registration.id()));
    }

    #[tokio::test]
    async fn write_failure_removes_subscriber() {
        let registry = Arc::new(SubscriberRegistry::default());
        let registration = registry.register(BrokenSink);
        registry.snapshot()[0]
            .try_enqueue(Payload::from("x"))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), registration.closed())
            .await
            .unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = Arc::new(SubscriberRegistry::default());
        let first = registry.register(channel_sink().0);
        let second = registry.register(channel_sink().0);

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(first.is_closed());
        assert!(second.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutation_during_snapshot() {
        let registry = Arc::new(SubscriberRegistry::default());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let registration = registry.register(channel_sink().0);
                    for subscriber in registry.snapshot() {
                        let _ = subscriber.try_enqueue(Payload::from("tick"));
                    }
                    registry.deregister(registration.id());
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(registry.is_empty());
    }
}

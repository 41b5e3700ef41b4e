//! Fan-out Broadcaster
//!
//! Delivers each log message to every open subscriber by enqueueing the
//! payload on the subscriber's outbound queue. Enqueueing never waits: a
//! subscriber whose queue is full is disconnected so it cannot stall the
//! others or the log consumer.

use std::sync::Arc;
use std::time::Instant;

use crate::application::services::registry::SubscriberRegistry;
use crate::domain::streaming::LogMessage;
use crate::infrastructure::metrics;

/// Outcome of broadcasting one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Open subscribers a delivery was attempted for.
    pub attempted: usize,
    /// Frames accepted onto a subscriber queue.
    pub enqueued: usize,
    /// Subscribers disconnected because delivery failed.
    pub dropped: usize,
}

/// Fans log messages out to the registry's subscribers.
#[derive(Debug, Clone)]
pub struct FanoutBroadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl FanoutBroadcaster {
    /// Create a broadcaster over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster delivers to.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `message` to every open subscriber.
    ///
    /// The payload is forwarded verbatim. Empty or absent payloads are
    /// skipped. Delivery failures disconnect the affected subscriber and
    /// are never returned to the caller.
    pub fn on_message(&self, message: &LogMessage) -> BroadcastReport {
        let Some(payload) = message.deliverable_payload() else {
            tracing::trace!(
                topic = %message.topic,
                offset = message.offset,
                "Skipping empty payload"
            );
            return BroadcastReport::default();
        };

        let started = Instant::now();
        let mut report = BroadcastReport::default();

        for subscriber in self.registry.snapshot() {
            if !subscriber.is_open() {
                continue;
            }
            report.attempted += 1;

            match subscriber.try_enqueue(payload.clone()) {
                Ok(()) => report.enqueued += 1,
                Err(e) => {
                    report.dropped += 1;
                    tracing::debug!(
                        subscriber = %subscriber.id(),
                        queued = subscriber.queued(),
                        error = %e,
                        "Dropping subscriber"
                    );
                    self.registry.disconnect(subscriber.id(), e.reason());
                }
            }
        }

        metrics::record_fanout(report.enqueued, started.elapsed());
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::ports::{PushSink, SinkError};
    use crate::application::services::registry::RegistryConfig;
    use crate::domain::streaming::{Payload, RSI_TOPIC};

    struct ChannelSink(mpsc::UnboundedSender<Payload>);

    #[async_trait]
    impl PushSink for ChannelSink {
        async fn send_frame(&mut self, payload: &Payload) -> Result<(), SinkError> {
            self.0.send(payload.clone()).map_err(|_| SinkError::Closed)
        }

        async fn close(&mut self) {}
    }

    struct StalledSink;

    #[async_trait]
    impl PushSink for StalledSink {
        async fn send_frame(&mut self, _payload: &Payload) -> Result<(), SinkError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    fn message(offset: i64, payload: &'static str) -> LogMessage {
        LogMessage::new(RSI_TOPIC, 0, offset, Some(Payload::from(payload)))
    }

    #[tokio::test]
    async fn no_subscribers_means_no_attempts() {
        let broadcaster = FanoutBroadcaster::new(Arc::new(SubscriberRegistry::default()));

        let report = broadcaster.on_message(&message(0, "hello"));

        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn empty_and_absent_payloads_are_skipped() {
        let registry = Arc::new(SubscriberRegistry::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(ChannelSink(tx));
        let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));

        let absent = LogMessage::new(RSI_TOPIC, 0, 0, None);
        let empty = LogMessage::new(RSI_TOPIC, 0, 1, Some(Payload::default()));

        assert_eq!(broadcaster.on_message(&absent), BroadcastReport::default());
        assert_eq!(broadcaster.on_message(&empty), BroadcastReport::default());

        broadcaster.on_message(&message(2, "after"));
        assert_eq!(rx.recv().await.unwrap(), Payload::from("after"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_payload() {
        let registry = Arc::new(SubscriberRegistry::default());
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.register(ChannelSink(tx));
            receivers.push(rx);
        }
        let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));

        let report = broadcaster.on_message(&message(0, r#"{"rsi":42.0}"#));

        assert_eq!(report.attempted, 3);
        assert_eq!(report.enqueued, 3);
        for rx in &mut receivers {
            assert_eq!(rx.recv().await.unwrap().as_text(), Some(r#"{"rsi":42.0}"#));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_affecting_others() {
        let registry = Arc::new(SubscriberRegistry::new(RegistryConfig {
            queue_capacity: 2,
            send_timeout: Duration::from_secs(60),
        }));
        let slow = registry.register(StalledSink);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fast = registry.register(ChannelSink(tx));
        let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));

        let mut dropped = 0;
        for offset in 0..6 {
            dropped += broadcaster.on_message(&message(offset, "tick")).dropped;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(dropped, 1);
        assert!(slow.is_closed());
        assert!(registry.contains(fast.id()));
        for _ in 0..6 {
            let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame, Payload::from("tick"));
        }
    }

    #[tokio::test]
    async fn removed_subscriber_is_not_attempted() {
        let registry = Arc::new(SubscriberRegistry::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let registration = registry.register(ChannelSink(tx));
        let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));

        registry.deregister(registration.id());

        assert_eq!(broadcaster.on_message(&message(0, "x")).attempted, 0);
    }
}

//! Relay Fan-out Integration Tests
//!
//! Drives the relay loop from an in-memory log into channel-backed
//! subscribers and checks delivery, ordering and isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use trade_relay::{
    FanoutBroadcaster, FeedStatus, InMemoryConsumer, InMemoryLog, LogError, Payload, PushSink,
    RSI_TOPIC, RegistryConfig, RelayError, RelayFeedState, RelaySummary, SinkError, SubscriberId,
    SubscriberRegistry, run_relay,
};

const WAIT: Duration = Duration::from_secs(5);

/// Sink that forwards frames to a channel the test reads.
struct ChannelSink(mpsc::UnboundedSender<Payload>);

#[async_trait]
impl PushSink for ChannelSink {
    async fn send_frame(&mut self, payload: &Payload) -> Result<(), SinkError> {
        self.0.send(payload.clone()).map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) {}
}

type RelayTask = JoinHandle<(Result<RelaySummary, RelayError>, InMemoryConsumer)>;

struct Harness {
    log: InMemoryLog,
    registry: Arc<SubscriberRegistry>,
    state: Arc<RelayFeedState>,
    relay: RelayTask,
}

fn start_relay(config: RegistryConfig) -> Harness {
    let log = InMemoryLog::new();
    let mut consumer = log.subscribe(RSI_TOPIC);
    let registry = Arc::new(SubscriberRegistry::new(config));
    let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));
    let state = Arc::new(RelayFeedState::new(RSI_TOPIC));

    let relay_state = Arc::clone(&state);
    let relay = tokio::spawn(async move {
        let result = run_relay(
            &mut consumer,
            &broadcaster,
            &relay_state,
            &CancellationToken::new(),
        )
        .await;
        (result, consumer)
    });

    Harness {
        log,
        registry,
        state,
        relay,
    }
}

fn subscribe(registry: &Arc<SubscriberRegistry>) -> (SubscriberId, mpsc::UnboundedReceiver<Payload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let registration = registry.register(ChannelSink(tx));
    (registration.id(), rx)
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Payload {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn finish(harness: Harness) -> (RelaySummary, InMemoryConsumer) {
    harness.log.close(RSI_TOPIC);
    let (result, consumer) = timeout(WAIT, harness.relay).await.unwrap().unwrap();
    (result.unwrap(), consumer)
}

#[tokio::test]
async fn every_subscriber_receives_every_message_in_order() {
    let harness = start_relay(RegistryConfig::default());
    let mut receivers: Vec<_> = (0..3).map(|_| subscribe(&harness.registry).1).collect();

    let sent: Vec<String> = (0..20)
        .map(|i| format!(r#"{{"token_address":"T","rsi":{i}}}"#))
        .collect();
    for payload in &sent {
        harness
            .log
            .append(RSI_TOPIC, None, Some(Payload::from(payload.clone())));
    }

    for rx in &mut receivers {
        for expected in &sent {
            assert_eq!(next_frame(rx).await.as_text(), Some(expected.as_str()));
        }
    }

    let (summary, consumer) = finish(harness).await;
    assert_eq!(summary.messages, 20);
    assert_eq!(summary.frames_enqueued, 60);
    assert_eq!(consumer.committed(), (0..20).collect::<Vec<i64>>().as_slice());
}

#[tokio::test]
async fn messages_with_no_subscribers_are_consumed_and_committed() {
    let harness = start_relay(RegistryConfig::default());

    for i in 0..5 {
        harness
            .log
            .append(RSI_TOPIC, None, Some(Payload::from(format!("m{i}"))));
    }

    let (summary, consumer) = finish(harness).await;
    assert_eq!(summary.messages, 5);
    assert_eq!(summary.frames_enqueued, 0);
    assert_eq!(consumer.committed().len(), 5);
}

#[tokio::test]
async fn departed_subscriber_does_not_affect_the_others() {
    let harness = start_relay(RegistryConfig::default());
    let (a, mut rx_a) = subscribe(&harness.registry);
    let (_b, mut rx_b) = subscribe(&harness.registry);

    harness.log.append(RSI_TOPIC, None, Some(Payload::from("first")));
    assert_eq!(next_frame(&mut rx_a).await, Payload::from("first"));
    assert_eq!(next_frame(&mut rx_b).await, Payload::from("first"));

    assert!(harness.registry.deregister(a));
    assert!(!harness.registry.deregister(a));

    harness.log.append(RSI_TOPIC, None, Some(Payload::from("second")));
    assert_eq!(next_frame(&mut rx_b).await, Payload::from("second"));

    // A's writer has stopped, so its channel ends without the second frame.
    assert!(timeout(WAIT, rx_a.recv()).await.unwrap().is_none());
    assert_eq!(harness.registry.len(), 1);

    let (summary, _) = finish(harness).await;
    assert_eq!(summary.messages, 2);
}

#[tokio::test]
async fn empty_payloads_are_not_forwarded() {
    let harness = start_relay(RegistryConfig::default());
    let (_id, mut rx) = subscribe(&harness.registry);

    harness.log.append(RSI_TOPIC, None, None);
    harness.log.append(RSI_TOPIC, None, Some(Payload::from("")));
    harness.log.append(RSI_TOPIC, None, Some(Payload::from("kept")));

    assert_eq!(next_frame(&mut rx).await, Payload::from("kept"));

    let (summary, consumer) = finish(harness).await;
    assert_eq!(summary.skipped, 2);
    assert_eq!(consumer.committed(), &[0, 1, 2]);
}

#[tokio::test]
async fn consume_error_stops_the_relay() {
    let harness = start_relay(RegistryConfig::default());
    harness.log.append(RSI_TOPIC, None, Some(Payload::from("ok")));
    harness.log.inject_error(
        RSI_TOPIC,
        LogError::Consume("broker transport failure".to_string()),
    );

    let (result, consumer) = timeout(WAIT, harness.relay).await.unwrap().unwrap();

    assert!(matches!(result, Err(RelayError::Consume(_))));
    assert_eq!(consumer.committed(), &[0]);
    assert_eq!(harness.state.status(), FeedStatus::Failed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn subscribers_see_log_order(
        payloads in prop::collection::vec("[a-z0-9]{1,16}", 0..40),
        subscribers in 1usize..4,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let received = runtime.block_on(async {
            let harness = start_relay(RegistryConfig::default());
            let mut receivers: Vec<_> =
                (0..subscribers).map(|_| subscribe(&harness.registry).1).collect();

            for payload in &payloads {
                harness.log.append(RSI_TOPIC, None, Some(Payload::from(payload.clone())));
            }

            let mut received = Vec::new();
            for rx in &mut receivers {
                let mut frames = Vec::new();
                for _ in 0..payloads.len() {
                    frames.push(next_frame(rx).await.as_text().unwrap().to_string());
                }
                received.push(frames);
            }

            finish(harness).await;
            received
        });

        for frames in received {
            prop_assert_eq!(&frames, &payloads);
        }
    }
}

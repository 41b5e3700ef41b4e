//! Log Consumption Loop
//!
//! Pulls messages from the log one at a time, hands each to the
//! broadcaster and then acknowledges it. The broadcaster only enqueues,
//! so the loop never waits on subscriber I/O.
//!
//! Delivery guarantee: the log redelivers at-least-once into the relay,
//! while each subscriber session receives a message at most once. There
//! is no replay for subscribers that connect later or reconnect.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{LogConsumer, LogError};
use crate::application::services::broadcaster::FanoutBroadcaster;
use crate::infrastructure::metrics;

// =============================================================================
// Feed State Tracking
// =============================================================================

/// Status of the upstream log feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Connecting to the broker.
    Connecting,
    /// Receiving messages.
    Consuming,
    /// Stopped cleanly.
    Stopped,
    /// Stopped on a consume error.
    Failed,
}

impl FeedStatus {
    /// Get the status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Consuming => "consuming",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Tracks the state of the log feed for health reporting.
#[derive(Debug)]
pub struct RelayFeedState {
    topic: String,
    status: RwLock<FeedStatus>,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    messages_consumed: AtomicU64,
    messages_skipped: AtomicU64,
    commit_failures: AtomicU64,
}

impl RelayFeedState {
    /// Create state for a feed on `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            status: RwLock::new(FeedStatus::Connecting),
            last_message_at: RwLock::new(None),
            error_message: RwLock::new(None),
            messages_consumed: AtomicU64::new(0),
            messages_skipped: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
        }
    }

    /// Set the feed status.
    pub fn set_status(&self, status: FeedStatus) {
        *self.status.write() = status;
        if status == FeedStatus::Consuming {
            *self.error_message.write() = None;
        }
    }

    /// Mark the feed failed with a message.
    pub fn set_error(&self, message: String) {
        *self.status.write() = FeedStatus::Failed;
        *self.error_message.write() = Some(message);
    }

    fn record_message(&self, skipped: bool) {
        self.messages_consumed.fetch_add(1, Ordering::Relaxed);
        if skipped {
            self.messages_skipped.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_message_at.write() = Some(Utc::now());
    }

    /// Topic being relayed.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        *self.status.read()
    }

    /// Last consume error, if failed.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    /// When the last message arrived.
    #[must_use]
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        *self.last_message_at.read()
    }

    /// Messages received from the log.
    #[must_use]
    pub fn messages_consumed(&self) -> u64 {
        self.messages_consumed.load(Ordering::Relaxed)
    }

    /// Messages skipped for having no payload.
    #[must_use]
    pub fn messages_skipped(&self) -> u64 {
        self.messages_skipped.load(Ordering::Relaxed)
    }

    /// Offset commits that failed.
    #[must_use]
    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Relay Loop
// =============================================================================

/// Fatal relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The log consumer failed; the loop cannot continue.
    #[error("log consumption failed: {0}")]
    Consume(#[source] LogError),
}

/// Totals for one run of the relay loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Messages received from the log.
    pub messages: u64,
    /// Messages skipped for having no payload.
    pub skipped: u64,
    /// Frames accepted onto subscriber queues.
    pub frames_enqueued: u64,
    /// Subscribers dropped for failed delivery.
    pub subscribers_dropped: u64,
}

/// Relay messages from `consumer` to the broadcaster until cancelled,
/// the source ends, or consumption fails.
///
/// # Errors
///
/// Returns `RelayError::Consume` when the consumer reports an error.
/// Commit failures are logged and do not stop the loop.
pub async fn run_relay<C>(
    consumer: &mut C,
    broadcaster: &FanoutBroadcaster,
    state: &RelayFeedState,
    cancel: &CancellationToken,
) -> Result<RelaySummary, RelayError>
where
    C: LogConsumer + ?Sized,
{
    let mut summary = RelaySummary::default();
    state.set_status(FeedStatus::Consuming);
    tracing::info!(topic = state.topic(), "Relay consuming");

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("Relay cancelled");
                break;
            }
            next = consumer.recv() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!("Log source ended");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Log consumption failed");
                state.set_error(e.to_string());
                return Err(RelayError::Consume(e));
            }
        };

        let skipped = message.deliverable_payload().is_none();
        metrics::record_message_consumed(skipped);
        state.record_message(skipped);

        let report = broadcaster.on_message(&message);
        summary.messages += 1;
        summary.skipped += u64::from(skipped);
        summary.frames_enqueued += report.enqueued as u64;
        summary.subscribers_dropped += report.dropped as u64;

        if let Err(e) = consumer.commit(&message) {
            state.commit_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                error = %e,
                partition = message.partition,
                offset = message.offset,
                "Offset commit failed"
            );
        }
    }

    state.set_status(FeedStatus::Stopped);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::application::services::registry::SubscriberRegistry;
    use crate::domain::streaming::{LogMessage, Payload, RSI_TOPIC};

    /// Scripted consumer replaying a fixed sequence of results.
    struct ScriptedConsumer {
        script: VecDeque<Result<Option<LogMessage>, LogError>>,
        committed: Vec<i64>,
        fail_commits: bool,
    }

    impl ScriptedConsumer {
        fn new(script: Vec<Result<Option<LogMessage>, LogError>>) -> Self {
            Self {
                script: script.into(),
                committed: Vec::new(),
                fail_commits: false,
            }
        }
    }

    #[async_trait]
    impl LogConsumer for ScriptedConsumer {
        async fn recv(&mut self) -> Result<Option<LogMessage>, LogError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn commit(&mut self, message: &LogMessage) -> Result<(), LogError> {
            if self.fail_commits {
                return Err(LogError::Commit("coordinator unavailable".to_string()));
            }
            self.committed.push(message.offset);
            Ok(())
        }
    }

    fn message(offset: i64, payload: Option<&'static str>) -> LogMessage {
        LogMessage::new(RSI_TOPIC, 0, offset, payload.map(Payload::from))
    }

    fn broadcaster() -> FanoutBroadcaster {
        FanoutBroadcaster::new(Arc::new(SubscriberRegistry::default()))
    }

    #[tokio::test]
    async fn commits_every_message_in_order() {
        let mut consumer = ScriptedConsumer::new(vec![
            Ok(Some(message(0, Some("a")))),
            Ok(Some(message(1, None))),
            Ok(Some(message(2, Some("c")))),
        ]);
        let state = RelayFeedState::new(RSI_TOPIC);

        let summary = run_relay(
            &mut consumer,
            &broadcaster(),
            &state,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.messages, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.frames_enqueued, 0);
        assert_eq!(consumer.committed, vec![0, 1, 2]);
        assert_eq!(state.status(), FeedStatus::Stopped);
        assert_eq!(state.messages_consumed(), 3);
        assert_eq!(state.messages_skipped(), 1);
        assert!(state.last_message_at().is_some());
    }

    #[tokio::test]
    async fn consume_error_is_fatal() {
        let mut consumer = ScriptedConsumer::new(vec![
            Ok(Some(message(0, Some("a")))),
            Err(LogError::Consume("broker transport failure".to_string())),
            Ok(Some(message(1, Some("never")))),
        ]);
        let state = RelayFeedState::new(RSI_TOPIC);

        let result = run_relay(
            &mut consumer,
            &broadcaster(),
            &state,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RelayError::Consume(_))));
        assert_eq!(consumer.committed, vec![0]);
        assert_eq!(state.status(), FeedStatus::Failed);
        assert!(state.error_message().unwrap().contains("broker transport failure"));
    }

    #[tokio::test]
    async fn commit_failure_does_not_stop_the_loop() {
        let mut consumer = ScriptedConsumer::new(vec![
            Ok(Some(message(0, Some("a")))),
            Ok(Some(message(1, Some("b")))),
        ]);
        consumer.fail_commits = true;
        let state = RelayFeedState::new(RSI_TOPIC);

        let summary = run_relay(
            &mut consumer,
            &broadcaster(),
            &state,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.messages, 2);
        assert_eq!(state.commit_failures(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_consumes_nothing() {
        let mut consumer = ScriptedConsumer::new(vec![Ok(Some(message(0, Some("a"))))]);
        let state = RelayFeedState::new(RSI_TOPIC);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = run_relay(&mut consumer, &broadcaster(), &state, &cancel)
            .await
            .unwrap();

        assert_eq!(summary, RelaySummary::default());
        assert!(consumer.committed.is_empty());
    }
}

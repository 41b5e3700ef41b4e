//! In-Memory Log
//!
//! A single-process stand-in for the broker, implementing both log ports.
//! Consumers see only messages appended after they subscribe, matching a
//! fresh consumer group that starts at the end of the topic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{LogConsumer, LogError, LogProducer};
use crate::domain::streaming::{LogMessage, Payload};

type Delivery = Result<LogMessage, LogError>;

#[derive(Default)]
struct TopicLog {
    records: Vec<(Option<String>, LogMessage)>,
    subscribers: Vec<mpsc::UnboundedSender<Delivery>>,
}

impl TopicLog {
    fn deliver(&mut self, delivery: &Delivery) {
        self.subscribers
            .retain(|subscriber| subscriber.send(delivery.clone()).is_ok());
    }
}

/// Shared in-memory log with one partition per topic.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    topics: Arc<Mutex<HashMap<String, TopicLog>>>,
}

impl InMemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to messages appended to `topic` from now on.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> InMemoryConsumer {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .subscribers
            .push(tx);
        InMemoryConsumer {
            rx,
            committed: Vec::new(),
        }
    }

    /// Append a record and deliver it to current subscribers.
    pub fn append(&self, topic: &str, key: Option<&str>, payload: Option<Payload>) -> LogMessage {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic.to_string()).or_default();
        let offset = i64::try_from(log.records.len()).unwrap_or(i64::MAX);
        let message = LogMessage::new(topic, 0, offset, payload);

        log.records
            .push((key.map(str::to_string), message.clone()));
        log.deliver(&Ok(message.clone()));
        message
    }

    /// Deliver a consume error to every subscriber of `topic`.
    pub fn inject_error(&self, topic: &str, error: LogError) {
        if let Some(log) = self.topics.lock().get_mut(topic) {
            log.deliver(&Err(error));
        }
    }

    /// End `topic` for current subscribers; their next `recv` returns `None`.
    pub fn close(&self, topic: &str) {
        if let Some(log) = self.topics.lock().get_mut(topic) {
            log.subscribers.clear();
        }
    }

    /// Messages appended to `topic`, in offset order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<LogMessage> {
        self.topics
            .lock()
            .get(topic)
            .map(|log| log.records.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Record keys for `topic`, in offset order.
    #[must_use]
    pub fn keys(&self, topic: &str) -> Vec<Option<String>> {
        self.topics
            .lock()
            .get(topic)
            .map(|log| log.records.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogProducer for InMemoryLog {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LogError> {
        self.append(topic, key, Some(Payload::copy_from_slice(payload)));
        Ok(())
    }
}

/// Consumer half of an [`InMemoryLog`] subscription.
pub struct InMemoryConsumer {
    rx: mpsc::UnboundedReceiver<Delivery>,
    committed: Vec<i64>,
}

impl InMemoryConsumer {
    /// Offsets acknowledged so far, in commit order.
    #[must_use]
    pub fn committed(&self) -> &[i64] {
        &self.committed
    }
}

#[async_trait]
impl LogConsumer for InMemoryConsumer {
    async fn recv(&mut self) -> Result<Option<LogMessage>, LogError> {
        self.rx.recv().await.transpose()
    }

    fn commit(&mut self, message: &LogMessage) -> Result<(), LogError> {
        self.committed.push(message.offset);
        Ok(())
    }
}

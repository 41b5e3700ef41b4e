//! Kafka consumer adapter.
//!
//! Offsets are stored only after the relay acknowledges a message and are
//! committed in the background by librdkafka. A group with no committed
//! offset starts at the end of the topic.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};

use crate::application::ports::{LogConsumer, LogError};
use crate::domain::streaming::{LogMessage, Payload};
use crate::infrastructure::config::KafkaSettings;

/// Broker metadata probe timeout at startup.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumer subscribed to one topic.
pub struct KafkaLogConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaLogConsumer {
    /// Create a consumer, check the broker is reachable and subscribe.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Connect` if the client cannot be created, the
    /// broker does not answer a metadata request, or the subscription fails.
    pub fn connect(settings: &KafkaSettings, topic: &str) -> Result<Self, LogError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &settings.group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| LogError::Connect(e.to_string()))?;

        tokio::task::block_in_place(|| {
            consumer.fetch_metadata(Some(topic), METADATA_TIMEOUT)
        })
        .map_err(|e| LogError::Connect(format!("{}: {e}", settings.brokers)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| LogError::Connect(e.to_string()))?;

        tracing::info!(
            brokers = %settings.brokers,
            group = %settings.group_id,
            topic,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }

    /// Subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn recv(&mut self) -> Result<Option<LogMessage>, LogError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| LogError::Consume(e.to_string()))?;

        Ok(Some(LogMessage::new(
            message.topic(),
            message.partition(),
            message.offset(),
            message.payload().map(Payload::copy_from_slice),
        )))
    }

    fn commit(&mut self, message: &LogMessage) -> Result<(), LogError> {
        // The stored position is the next offset to read.
        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| LogError::Commit(e.to_string()))?;

        self.consumer
            .store_offsets(&positions)
            .map_err(|e| LogError::Commit(e.to_string()))
    }
}

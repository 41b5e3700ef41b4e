//! Kafka producer adapter.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::application::ports::{LogError, LogProducer};
use crate::infrastructure::config::KafkaSettings;

/// Producer with a fixed per-message delivery timeout.
#[derive(Clone)]
pub struct KafkaLogProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaLogProducer {
    /// Create a producer.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Connect` if the client cannot be created.
    pub fn connect(settings: &KafkaSettings, timeout: Duration) -> Result<Self, LogError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create()
            .map_err(|e| LogError::Connect(e.to_string()))?;

        tracing::info!(brokers = %settings.brokers, "Kafka producer created");
        Ok(Self { producer, timeout })
    }

    /// Wait for all outstanding deliveries.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Publish` if messages are still queued at the deadline.
    pub async fn flush(&self) -> Result<(), LogError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| LogError::Publish {
                topic: "*".to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| LogError::Publish {
                topic: "*".to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl LogProducer for KafkaLogProducer {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), LogError> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| LogError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

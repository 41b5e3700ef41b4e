//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `LogConsumer`: Ordered message supply from one subscribed topic
//! - `LogProducer`: Publishing records to a topic
//! - `PushSink`: Write half of one push-transport connection

use async_trait::async_trait;

use crate::domain::streaming::{LogMessage, Payload};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the log client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    /// Could not create the client or reach the broker.
    #[error("failed to connect to log broker: {0}")]
    Connect(String),

    /// Receiving the next message failed.
    #[error("failed to consume from log: {0}")]
    Consume(String),

    /// Storing or committing the consumed offset failed.
    #[error("failed to commit offset: {0}")]
    Commit(String),

    /// Publishing a record failed.
    #[error("failed to publish to topic {topic}: {reason}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Broker or client error.
        reason: String,
    },
}

/// Errors raised while writing to a push-transport connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The transport rejected the write.
    #[error("transport write failed: {0}")]
    Transport(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// Log Ports
// =============================================================================

/// Ordered message supply for one subscribed topic.
#[async_trait]
pub trait LogConsumer: Send {
    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the source has ended and no further
    /// messages will arrive.
    async fn recv(&mut self) -> Result<Option<LogMessage>, LogError>;

    /// Acknowledge that `message` has been processed.
    fn commit(&mut self, message: &LogMessage) -> Result<(), LogError>;
}

/// Publishes records to the log.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Publish one record and wait for the broker acknowledgement.
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8])
    -> Result<(), LogError>;
}

// =============================================================================
// Push Transport Port
// =============================================================================

/// Write half of one live push-transport connection.
///
/// Each call to `send_frame` writes the payload as exactly one frame.
#[async_trait]
pub trait PushSink: Send + 'static {
    /// Write one frame.
    async fn send_frame(&mut self, payload: &Payload) -> Result<(), SinkError>;

    /// Close the connection. Errors are ignored; the peer may be gone.
    async fn close(&mut self);
}

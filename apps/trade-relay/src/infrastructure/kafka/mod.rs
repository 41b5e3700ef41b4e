//! Kafka Adapters
//!
//! rdkafka-backed implementations of the log ports.

mod consumer;
mod producer;

pub use consumer::KafkaLogConsumer;
pub use producer::KafkaLogProducer;

//! Configuration Module
//!
//! Environment-driven configuration for the bridge, ingestion and RSI
//! processor binaries.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_KAFKA_BROKERS, IngestSettings, KafkaSettings, ProcessorSettings,
    RELAY_GROUP_ID, RSI_GROUP_ID, RelayConfig,
};

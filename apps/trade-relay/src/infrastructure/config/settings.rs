//! Relay Configuration Settings
//!
//! Configuration types for the three binaries, loaded from environment
//! variables. Unparseable numbers fall back to their defaults; values that
//! parse but make no sense are rejected with [`ConfigError`].

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{IngestConfig, RegistryConfig};
use crate::domain::indicators::DEFAULT_RSI_WINDOW;
use crate::domain::streaming::{RAW_TRADES_TOPIC, RSI_TOPIC};

/// Default Kafka bootstrap servers.
pub const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

/// Consumer group used by the WebSocket bridge.
pub const RELAY_GROUP_ID: &str = "ws-bridge-group";

/// Consumer group used by the RSI processor.
pub const RSI_GROUP_ID: &str = "rsi-group";

/// Kafka connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// Consumer group id.
    pub group_id: String,
}

impl KafkaSettings {
    fn load<F>(lookup: &F, group_id: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let brokers = lookup("KAFKA_BROKERS")
            .or_else(|| lookup("KAFKA_BROKER"))
            .unwrap_or_else(|| DEFAULT_KAFKA_BROKERS.to_string());

        if brokers.trim().is_empty() {
            return Err(ConfigError::EmptyValue("KAFKA_BROKERS".to_string()));
        }

        Ok(Self {
            brokers: brokers.trim().to_string(),
            group_id: group_id.to_string(),
        })
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Configuration for the WebSocket bridge.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Kafka connection.
    pub kafka: KafkaSettings,
    /// Topic relayed to subscribers.
    pub topic: String,
    /// WebSocket listen port.
    pub ws_port: u16,
    /// Per-subscriber queue and write timeout.
    pub registry: RegistryConfig,
    /// Health server port, `None` when disabled.
    pub health_port: Option<u16>,
}

impl RelayConfig {
    /// Default WebSocket port.
    pub const DEFAULT_WS_PORT: u16 = 4000;

    /// Default health server port.
    pub const DEFAULT_HEALTH_PORT: u16 = 8084;

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RegistryConfig::default();

        let queue_capacity = parse_positive(
            &lookup,
            "RELAY_QUEUE_CAPACITY",
            defaults.queue_capacity as u64,
        )?;
        let send_timeout_ms = parse_positive(
            &lookup,
            "RELAY_SEND_TIMEOUT_MS",
            duration_millis(defaults.send_timeout),
        )?;
        let health_port = parse_or(&lookup, "RELAY_HEALTH_PORT", Self::DEFAULT_HEALTH_PORT);

        Ok(Self {
            kafka: KafkaSettings::load(&lookup, RELAY_GROUP_ID)?,
            topic: RSI_TOPIC.to_string(),
            ws_port: parse_or(&lookup, "WS_PORT", Self::DEFAULT_WS_PORT),
            registry: RegistryConfig {
                queue_capacity: usize::try_from(queue_capacity).unwrap_or(usize::MAX),
                send_timeout: Duration::from_millis(send_timeout_ms),
            },
            health_port: (health_port != 0).then_some(health_port),
        })
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Configuration for CSV ingestion.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Kafka connection.
    pub kafka: KafkaSettings,
    /// CSV file to read.
    pub csv_path: PathBuf,
    /// Publish settings.
    pub ingest: IngestConfig,
    /// Per-message delivery timeout.
    pub publish_timeout: Duration,
}

impl IngestSettings {
    /// Default CSV file name.
    pub const DEFAULT_CSV_PATH: &'static str = "trades_data.csv";

    /// Create configuration from environment variables.
    ///
    /// `cli_path` overrides `TRADES_CSV` when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_env(cli_path: Option<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_path)
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_lookup<F>(lookup: F, cli_path: Option<String>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let csv_path = cli_path
            .or_else(|| lookup("TRADES_CSV"))
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_CSV_PATH.to_string());

        let max_in_flight = parse_positive(
            &lookup,
            "INGEST_MAX_IN_FLIGHT",
            IngestConfig::default().max_in_flight as u64,
        )?;
        let publish_timeout_ms = parse_positive(&lookup, "INGEST_PUBLISH_TIMEOUT_MS", 5_000)?;

        Ok(Self {
            // Ingestion only produces; the group id is unused.
            kafka: KafkaSettings::load(&lookup, "trade-ingest")?,
            csv_path: PathBuf::from(csv_path),
            ingest: IngestConfig {
                topic: RAW_TRADES_TOPIC.to_string(),
                max_in_flight: usize::try_from(max_in_flight).unwrap_or(usize::MAX),
            },
            publish_timeout: Duration::from_millis(publish_timeout_ms),
        })
    }
}

// =============================================================================
// RSI Processor
// =============================================================================

/// Configuration for the RSI processor.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Kafka connection.
    pub kafka: KafkaSettings,
    /// Topic carrying raw trades.
    pub input_topic: String,
    /// Topic receiving RSI readings.
    pub output_topic: String,
    /// Prices per RSI window.
    pub window: usize,
    /// Per-message delivery timeout.
    pub publish_timeout: Duration,
}

impl ProcessorSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let window = parse_or(&lookup, "RSI_WINDOW", DEFAULT_RSI_WINDOW as u64);
        if window < 2 {
            return Err(ConfigError::InvalidValue {
                key: "RSI_WINDOW".to_string(),
                reason: "must be at least 2".to_string(),
            });
        }

        Ok(Self {
            kafka: KafkaSettings::load(&lookup, RSI_GROUP_ID)?,
            input_topic: RAW_TRADES_TOPIC.to_string(),
            output_topic: RSI_TOPIC.to_string(),
            window: usize::try_from(window).unwrap_or(usize::MAX),
            publish_timeout: Duration::from_secs(5),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default) {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        value => Ok(value),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Trade Relay - Log to WebSocket Fan-out
//!
//! Consumes the derived analytics topic from Kafka and pushes every
//! message, byte for byte, to all connected WebSocket clients. The crate
//! also carries the two producer stages of the pipeline: CSV trade
//! ingestion and the per-token RSI processor.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Log messages and opaque payloads
//!   - `subscription`: Subscriber ids, lifecycle states, disconnect reasons
//!   - `indicators`: RSI over a sliding price window
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Log consumer/producer and push sink interfaces
//!   - `services`: Registry, broadcaster, relay loop, ingestion, RSI
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kafka`: rdkafka consumer and producer
//!   - `memory`: In-process log for tests
//!   - `websocket`: axum upgrade handler and sink
//!   - `csv_reader`: CSV trade file reader
//!   - `config`, `health`, `metrics`, `telemetry`, `runtime`
//!
//! # Data Flow
//!
//! ```text
//! CSV ──► trade-ingest ──► trade-data ──► rsi-processor ──► rsi-data
//!                                                              │
//!                                         ┌────────────────────┘
//!                                         ▼
//!                                   ┌───────────┐     ┌──────────┐
//!                                   │   Relay   │────►│ Registry │──► Client 1
//!                                   │   Loop    │     │ (queues) │──► Client 2
//!                                   └───────────┘     └──────────┘──► Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{LogMessage, Payload, RAW_TRADES_TOPIC, RSI_TOPIC};
pub use domain::subscription::{DisconnectReason, SubscriberId, SubscriberState};

// Ports
pub use application::ports::{LogConsumer, LogError, LogProducer, PushSink, SinkError};

// Services
pub use application::services::{
    BroadcastReport, FanoutBroadcaster, FeedStatus, IngestConfig, IngestReport, RegistryConfig,
    RelayError, RelayFeedState, RelaySummary, RsiProcessor, RsiReading, SubscriberRegistry,
    TradeIngestor, run_relay, run_rsi_processor,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IngestSettings, ProcessorSettings, RelayConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Adapters
pub use infrastructure::kafka::{KafkaLogConsumer, KafkaLogProducer};
pub use infrastructure::memory::{InMemoryConsumer, InMemoryLog};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

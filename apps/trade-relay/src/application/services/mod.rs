//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriberRegistry`: Live set of push-transport subscribers
//! - `FanoutBroadcaster`: Delivers each log message to every subscriber
//! - `run_relay`: Log consumption loop feeding the broadcaster
//! - `TradeIngestor`: Publishes CSV rows to the raw topic
//! - `RsiProcessor`: Derives the RSI stream from raw trades

pub mod broadcaster;
pub mod ingest;
pub mod registry;
pub mod relay;
pub mod rsi;

pub use broadcaster::{BroadcastReport, FanoutBroadcaster};
pub use ingest::{IngestConfig, IngestReport, RowError, TradeIngestor, TradeRow};
pub use registry::{
    DeliveryError, Registration, RegistryConfig, Subscriber, SubscriberRegistry,
};
pub use relay::{FeedStatus, RelayError, RelayFeedState, RelaySummary, run_relay};
pub use rsi::{
    RsiProcessor, RsiReading, RsiSummary, TradeDecodeError, TradeEvent, run_rsi_processor,
};

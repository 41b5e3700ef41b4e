//! RSI Processing
//!
//! Turns raw trades into per-token RSI readings. Each token keeps its own
//! sliding price window; once full, every trade yields one reading keyed
//! by the token address.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{LogConsumer, LogProducer};
use crate::application::services::relay::RelayError;
use crate::domain::indicators::{DEFAULT_RSI_WINDOW, PriceWindow};
use crate::infrastructure::metrics;

// =============================================================================
// Trade Decoding
// =============================================================================

/// One raw trade as published by ingestion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeEvent {
    /// Token the trade priced.
    pub token_address: String,
    /// Price, accepted as a JSON number or numeric string.
    #[serde(deserialize_with = "lenient_f64")]
    pub price_in_sol: f64,
    /// Block time of the trade, if known.
    #[serde(default, deserialize_with = "non_empty_string")]
    pub block_time: Option<String>,
}

/// A trade payload that could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("undecodable trade: {0}")]
pub struct TradeDecodeError(#[from] serde_json::Error);

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

// =============================================================================
// Readings
// =============================================================================

/// One published RSI value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    /// Token the reading belongs to.
    pub token_address: String,
    /// RSI in `[0, 100]`.
    pub rsi: f64,
    /// Trade block time, or processing time in RFC 3339.
    pub timestamp: String,
}

/// Per-token RSI state.
#[derive(Debug)]
pub struct RsiProcessor {
    window: usize,
    windows: HashMap<String, PriceWindow>,
}

impl Default for RsiProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_RSI_WINDOW)
    }
}

impl RsiProcessor {
    /// Create a processor with `window` prices per token.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window,
            windows: HashMap::new(),
        }
    }

    /// Feed one raw trade payload.
    ///
    /// Returns a reading once the token's window is full.
    ///
    /// # Errors
    ///
    /// Returns `TradeDecodeError` when the payload is not a valid trade.
    pub fn process(&mut self, payload: &[u8]) -> Result<Option<RsiReading>, TradeDecodeError> {
        let trade: TradeEvent = serde_json::from_slice(payload)?;
        Ok(self.push(trade))
    }

    /// Feed one decoded trade.
    pub fn push(&mut self, trade: TradeEvent) -> Option<RsiReading> {
        let window = self.window;
        let rsi = self
            .windows
            .entry(trade.token_address.clone())
            .or_insert_with(|| PriceWindow::new(window))
            .push(trade.price_in_sol)?;

        let timestamp = trade
            .block_time
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        Some(RsiReading {
            token_address: trade.token_address,
            rsi,
            timestamp,
        })
    }

    /// Number of tokens with a price window.
    #[must_use]
    pub fn tracked_tokens(&self) -> usize {
        self.windows.len()
    }
}

// =============================================================================
// Processing Loop
// =============================================================================

/// Totals for one run of the RSI loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsiSummary {
    /// Trades received.
    pub trades: u64,
    /// Trades that failed to decode.
    pub undecodable: u64,
    /// Readings published.
    pub published: u64,
    /// Readings whose publish failed.
    pub publish_failures: u64,
}

/// Consume trades, publish readings to `output_topic` keyed by token.
///
/// # Errors
///
/// Returns `RelayError::Consume` when the consumer reports an error.
pub async fn run_rsi_processor<C, P>(
    consumer: &mut C,
    producer: &P,
    processor: &mut RsiProcessor,
    output_topic: &str,
    cancel: &CancellationToken,
) -> Result<RsiSummary, RelayError>
where
    C: LogConsumer + ?Sized,
    P: LogProducer + ?Sized,
{
    let mut summary = RsiSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = consumer.recv() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Trade consumption failed");
                return Err(RelayError::Consume(e));
            }
        };

        if let Some(payload) = message.deliverable_payload() {
            summary.trades += 1;
            match processor.process(payload.as_bytes()) {
                Ok(Some(reading)) => {
                    publish_reading(producer, output_topic, &reading, &mut summary).await;
                }
                Ok(None) => {}
                Err(e) => {
                    summary.undecodable += 1;
                    tracing::debug!(error = %e, offset = message.offset, "Skipping trade");
                }
            }
        }

        if let Err(e) = consumer.commit(&message) {
            tracing::warn!(error = %e, offset = message.offset, "Offset commit failed");
        }
    }

    tracing::info!(
        trades = summary.trades,
        published = summary.published,
        tokens = processor.tracked_tokens(),
        "RSI processor stopped"
    );
    Ok(summary)
}

async fn publish_reading<P: LogProducer + ?Sized>(
    producer: &P,
    topic: &str,
    reading: &RsiReading,
    summary: &mut RsiSummary,
) {
    let payload = match serde_json::to_vec(reading) {
        Ok(payload) => payload,
        Err(e) => {
            summary.publish_failures += 1;
            tracing::error!(error = %e, "Failed to encode RSI reading");
            return;
        }
    };

    match producer
        .publish(topic, Some(&reading.token_address), &payload)
        .await
    {
        Ok(()) => {
            summary.published += 1;
            metrics::record_rsi_published();
            tracing::debug!(
                token = %reading.token_address,
                rsi = reading.rsi,
                "Published RSI"
            );
        }
        Err(e) => {
            summary.publish_failures += 1;
            tracing::error!(error = %e, token = %reading.token_address, "Failed to publish RSI");
        }
    }
}

//! Trade Ingestion
//!
//! Publishes one JSON-encoded message per CSV row to the raw trades topic.
//! Malformed rows and failed publishes are logged and counted; ingestion
//! always runs to the end of the input.

use futures::StreamExt;
use futures::stream;

use crate::application::ports::LogProducer;
use crate::domain::streaming::RAW_TRADES_TOPIC;
use crate::infrastructure::metrics;

/// One CSV row as a header-to-value JSON object, in header order.
pub type TradeRow = serde_json::Map<String, serde_json::Value>;

/// A row that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed row at line {line}: {reason}")]
pub struct RowError {
    /// 1-based line number in the source file.
    pub line: u64,
    /// What was wrong with it.
    pub reason: String,
}

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Destination topic.
    pub topic: String,
    /// Maximum publishes awaiting acknowledgement at once.
    pub max_in_flight: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic: RAW_TRADES_TOPIC.to_string(),
            max_in_flight: 16,
        }
    }
}

/// Totals for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows published successfully.
    pub published: u64,
    /// Rows rejected by the reader.
    pub malformed: u64,
    /// Rows whose publish failed.
    pub failed: u64,
}

impl IngestReport {
    /// Rows seen in total.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.published + self.malformed + self.failed
    }

    const fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Published => self.published += 1,
            RowOutcome::Malformed => self.malformed += 1,
            RowOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RowOutcome {
    Published,
    Malformed,
    Failed,
}

impl RowOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Malformed => "malformed",
            Self::Failed => "failed",
        }
    }
}

/// Publishes CSV rows through a [`LogProducer`].
pub struct TradeIngestor<P> {
    producer: P,
    config: IngestConfig,
}

impl<P: LogProducer> TradeIngestor<P> {
    /// Create an ingestor.
    #[must_use]
    pub const fn new(producer: P, config: IngestConfig) -> Self {
        Self { producer, config }
    }

    /// The underlying producer.
    #[must_use]
    pub const fn producer(&self) -> &P {
        &self.producer
    }

    /// Publish every row, with at most `max_in_flight` publishes pending.
    ///
    /// Completion order matches row order.
    pub async fn ingest<I>(&self, rows: I) -> IngestReport
    where
        I: IntoIterator<Item = Result<TradeRow, RowError>>,
    {
        let report = stream::iter(rows)
            .map(|row| self.publish_row(row))
            .buffered(self.config.max_in_flight.max(1))
            .fold(IngestReport::default(), |mut report, outcome| async move {
                metrics::record_ingest_row(outcome.as_str());
                report.record(outcome);
                report
            })
            .await;

        tracing::info!(
            topic = %self.config.topic,
            published = report.published,
            malformed = report.malformed,
            failed = report.failed,
            "Ingestion finished"
        );
        report
    }

    async fn publish_row(&self, row: Result<TradeRow, RowError>) -> RowOutcome {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(line = e.line, error = %e, "Skipping malformed trade row");
                return RowOutcome::Malformed;
            }
        };

        let payload = match serde_json::to_vec(&row) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode trade row");
                return RowOutcome::Failed;
            }
        };

        match self
            .producer
            .publish(&self.config.topic, None, &payload)
            .await
        {
            Ok(()) => {
                tracing::debug!(row = ?row, "Sent trade");
                RowOutcome::Published
            }
            Err(e) => {
                tracing::error!(error = %e, "Error sending trade");
                RowOutcome::Failed
            }
        }
    }
}

//! Trade Ingestion Binary
//!
//! Publishes every row of a trades CSV file to the raw trades topic.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-ingest -- path/to/trades.csv
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BROKERS` (or `KAFKA_BROKER`): Bootstrap servers (default: localhost:9092)
//! - `TRADES_CSV`: CSV path when no argument is given (default: trades_data.csv)
//! - `INGEST_MAX_IN_FLIGHT`: Concurrent unacknowledged publishes (default: 16)
//! - `INGEST_PUBLISH_TIMEOUT_MS`: Per-message delivery timeout (default: 5000)

use anyhow::Context;
use trade_relay::infrastructure::csv_reader::read_trade_rows;
use trade_relay::infrastructure::runtime::load_dotenv;
use trade_relay::infrastructure::telemetry;
use trade_relay::{IngestSettings, KafkaLogProducer, TradeIngestor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init("trade-ingest");

    let settings = IngestSettings::from_env(std::env::args().nth(1))
        .context("invalid ingestion configuration")?;

    tracing::info!(
        brokers = %settings.kafka.brokers,
        path = %settings.csv_path.display(),
        topic = %settings.ingest.topic,
        max_in_flight = settings.ingest.max_in_flight,
        "Starting trade ingestion"
    );

    let rows = read_trade_rows(&settings.csv_path)?;
    let producer = KafkaLogProducer::connect(&settings.kafka, settings.publish_timeout)
        .context("failed to create Kafka producer")?;

    let ingestor = TradeIngestor::new(producer, settings.ingest);
    let report = ingestor.ingest(rows).await;

    if let Err(e) = ingestor.producer().flush().await {
        tracing::warn!(error = %e, "Producer flush incomplete");
    }

    tracing::info!(
        published = report.published,
        malformed = report.malformed,
        failed = report.failed,
        "Trade ingestion complete"
    );
    Ok(())
}

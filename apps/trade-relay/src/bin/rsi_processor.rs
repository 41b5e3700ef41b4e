//! RSI Processor Binary
//!
//! Derives per-token RSI readings from raw trades.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin rsi-processor
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BROKERS` (or `KAFKA_BROKER`): Bootstrap servers (default: localhost:9092)
//! - `RSI_WINDOW`: Prices per RSI window (default: 14)

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use trade_relay::infrastructure::runtime::{await_shutdown, load_dotenv};
use trade_relay::infrastructure::telemetry;
use trade_relay::{
    KafkaLogConsumer, KafkaLogProducer, ProcessorSettings, RsiProcessor, run_rsi_processor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init("rsi-processor");

    let settings = ProcessorSettings::from_env().context("invalid processor configuration")?;

    tracing::info!(
        brokers = %settings.kafka.brokers,
        input = %settings.input_topic,
        output = %settings.output_topic,
        window = settings.window,
        "Starting RSI processor"
    );

    let mut consumer = KafkaLogConsumer::connect(&settings.kafka, &settings.input_topic)
        .context("failed to connect to Kafka")?;
    let producer = KafkaLogProducer::connect(&settings.kafka, settings.publish_timeout)
        .context("failed to create Kafka producer")?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut processor = RsiProcessor::new(settings.window);
    let result = run_rsi_processor(
        &mut consumer,
        &producer,
        &mut processor,
        &settings.output_topic,
        &shutdown_token,
    )
    .await;

    shutdown_token.cancel();
    if let Err(e) = producer.flush().await {
        tracing::warn!(error = %e, "Producer flush incomplete");
    }

    let summary = result.context("RSI processor stopped")?;
    tracing::info!(
        trades = summary.trades,
        published = summary.published,
        "RSI processor finished"
    );
    Ok(())
}

//! Trade Relay Binary
//!
//! Relays the RSI topic to WebSocket subscribers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-relay
//! ```
//!
//! # Environment Variables
//!
//! - `KAFKA_BROKERS` (or `KAFKA_BROKER`): Bootstrap servers (default: localhost:9092)
//! - `WS_PORT`: WebSocket listen port (default: 4000)
//! - `RELAY_QUEUE_CAPACITY`: Frames buffered per subscriber (default: 256)
//! - `RELAY_SEND_TIMEOUT_MS`: Per-frame write timeout (default: 5000)
//! - `RELAY_HEALTH_PORT`: Health/metrics HTTP port, 0 disables (default: 8084)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: true)
//! - `RUST_LOG`: Log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use trade_relay::infrastructure::health::{HealthServer, HealthServerState};
use trade_relay::infrastructure::runtime::{SHUTDOWN_TIMEOUT, await_shutdown, load_dotenv};
use trade_relay::infrastructure::{telemetry, websocket};
use trade_relay::{
    FanoutBroadcaster, KafkaLogConsumer, RelayConfig, RelayFeedState, SubscriberRegistry,
    init_metrics, run_relay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_dotenv();

    let _telemetry_guard = telemetry::init("trade-relay");

    tracing::info!(env_file = ?env_file, "Starting trade relay");

    init_metrics().context("failed to install metrics recorder")?;

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    log_config(&config);

    let mut consumer = KafkaLogConsumer::connect(&config.kafka, &config.topic)
        .context("failed to connect to Kafka")?;

    let ws_addr = SocketAddr::from(([0, 0, 0, 0], config.ws_port));
    let listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket port {}", config.ws_port))?;

    let shutdown_token = CancellationToken::new();
    let registry = Arc::new(SubscriberRegistry::new(config.registry));
    let broadcaster = FanoutBroadcaster::new(Arc::clone(&registry));
    let feed_state = Arc::new(RelayFeedState::new(config.topic.clone()));

    if let Some(port) = config.health_port {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&feed_state),
            Arc::clone(&registry),
        ));
        let health_server = HealthServer::new(port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let ws_registry = Arc::clone(&registry);
    let ws_shutdown = shutdown_token.clone();
    let ws_server = tokio::spawn(async move {
        if let Err(e) = websocket::serve(listener, ws_registry, ws_shutdown.clone()).await {
            tracing::error!(error = %e, "WebSocket server error");
            ws_shutdown.cancel();
        }
    });

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!(port = config.ws_port, topic = %config.topic, "Trade relay ready");

    let result = run_relay(&mut consumer, &broadcaster, &feed_state, &shutdown_token).await;

    shutdown_token.cancel();
    let closed = registry.close_all();
    tracing::info!(closed, "Closed subscriber connections");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, ws_server).await.is_err() {
        tracing::warn!("WebSocket server did not stop in time");
    }

    let summary = result.context("relay stopped")?;
    tracing::info!(
        messages = summary.messages,
        skipped = summary.skipped,
        frames = summary.frames_enqueued,
        dropped = summary.subscribers_dropped,
        "Trade relay stopped"
    );
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        brokers = %config.kafka.brokers,
        group = %config.kafka.group_id,
        topic = %config.topic,
        ws_port = config.ws_port,
        health_port = ?config.health_port,
        queue_capacity = config.registry.queue_capacity,
        send_timeout_ms = config.registry.send_timeout.as_millis(),
        "Configuration loaded"
    );
}

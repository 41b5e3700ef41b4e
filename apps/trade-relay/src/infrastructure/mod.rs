//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loading.
pub mod config;

/// CSV trade file reader.
pub mod csv_reader;

/// Health check HTTP endpoint.
pub mod health;

/// Kafka log client adapters.
pub mod kafka;

/// In-memory log for tests and local runs.
pub mod memory;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Process lifecycle helpers.
pub mod runtime;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket listener and sink adapter.
pub mod websocket;

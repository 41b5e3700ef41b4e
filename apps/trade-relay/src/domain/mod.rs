//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the message, subscriber and indicator types
//! with no runtime dependencies. Nothing here performs I/O.

/// Relayed message types and topic names.
pub mod streaming;

/// Subscriber identity and lifecycle state.
pub mod subscription;

/// Technical indicators computed over trade prices.
pub mod indicators;

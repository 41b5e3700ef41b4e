//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay services and the port interfaces
//! that define how the relay talks to the log and to subscribers.

/// Port interfaces for external systems (log client, push transport).
pub mod ports;

/// Application services: registry, broadcaster, relay loop, producers.
pub mod services;

//! Subscriber Identity and Lifecycle
//!
//! A subscriber is one live push-transport connection. Its state only
//! moves forward:
//!
//! ```text
//! connecting ──► open ──► closing ──► closed
//!      │                                ▲
//!      └────────────────────────────────┘
//! ```
//!
//! Only `open` subscribers are members of the registry and receive frames.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscriber, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Connection state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SubscriberState {
    /// Transport upgraded, not yet registered.
    Connecting = 0,
    /// Registered and receiving frames.
    Open = 1,
    /// Removed from the registry, writer shutting down.
    Closing = 2,
    /// Writer finished and transport closed.
    Closed = 3,
}

impl SubscriberState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Atomically updated subscriber state that never moves backwards.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self::new(SubscriberState::Connecting)
    }
}

impl StateCell {
    /// Create a cell in the given state.
    #[must_use]
    pub const fn new(state: SubscriberState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> SubscriberState {
        SubscriberState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `next` if it is later than the current state.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn advance(&self, next: SubscriberState) -> bool {
        let next_raw = next as u8;
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < next_raw).then_some(next_raw)
            })
            .is_ok()
    }
}

// =============================================================================
// Delivery Failure
// =============================================================================

/// Why a subscriber was dropped from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Outbound queue saturated (slow consumer).
    QueueFull,
    /// Outbound queue already closed.
    QueueClosed,
    /// A frame write exceeded the send timeout.
    SendTimeout,
    /// The transport rejected a frame write.
    WriteFailed,
    /// The client closed the connection or sent a protocol error.
    ClientClosed,
    /// The relay is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Metric label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::SendTimeout => "send_timeout",
            Self::WriteFailed => "write_failed",
            Self::ClientClosed => "client_closed",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether this reason is a delivery failure rather than a normal close.
    #[must_use]
    pub const fn is_delivery_failure(self) -> bool {
        matches!(
            self,
            Self::QueueFull | Self::QueueClosed | Self::SendTimeout | Self::WriteFailed
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn new_cell_is_connecting() {
        assert_eq!(StateCell::default().get(), SubscriberState::Connecting);
    }

    #[test]
    fn state_only_moves_forward() {
        let cell = StateCell::default();

        assert!(cell.advance(SubscriberState::Open));
        assert!(cell.advance(SubscriberState::Closing));
        assert!(!cell.advance(SubscriberState::Open));
        assert_eq!(cell.get(), SubscriberState::Closing);

        assert!(cell.advance(SubscriberState::Closed));
        assert!(!cell.advance(SubscriberState::Closing));
        assert_eq!(cell.get(), SubscriberState::Closed);
    }

    #[test]
    fn repeated_transition_reports_once() {
        let cell = StateCell::new(SubscriberState::Open);
        assert!(cell.advance(SubscriberState::Closing));
        assert!(!cell.advance(SubscriberState::Closing));
    }

    #[test]
    fn connecting_can_close_directly() {
        let cell = StateCell::default();
        assert!(cell.advance(SubscriberState::Closed));
        assert_eq!(cell.get(), SubscriberState::Closed);
    }

    #[test_case(SubscriberState::Connecting, "connecting")]
    #[test_case(SubscriberState::Open, "open")]
    #[test_case(SubscriberState::Closing, "closing")]
    #[test_case(SubscriberState::Closed, "closed")]
    fn state_names(state: SubscriberState, expected: &str) {
        assert_eq!(state.as_str(), expected);
    }

    #[test_case(DisconnectReason::QueueFull, true)]
    #[test_case(DisconnectReason::QueueClosed, true)]
    #[test_case(DisconnectReason::SendTimeout, true)]
    #[test_case(DisconnectReason::WriteFailed, true)]
    #[test_case(DisconnectReason::ClientClosed, false)]
    #[test_case(DisconnectReason::Shutdown, false)]
    fn delivery_failure_classification(reason: DisconnectReason, expected: bool) {
        assert_eq!(reason.is_delivery_failure(), expected);
    }

    #[test]
    fn subscriber_ids_order_by_registration() {
        let first = SubscriberId::new(1);
        let second = SubscriberId::new(2);
        assert!(first < second);
        assert_eq!(first.to_string(), "sub-1");
    }
}

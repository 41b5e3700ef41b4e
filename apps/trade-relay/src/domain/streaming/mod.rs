//! Relayed Message Types
//!
//! The bridge treats every log message as an opaque byte payload. These
//! types carry that payload from the log client to the subscribers
//! without ever decoding it.

use std::fmt;

use bytes::Bytes;

// =============================================================================
// Topics
// =============================================================================

/// Topic carrying one JSON-encoded CSV row per message.
pub const RAW_TRADES_TOPIC: &str = "trade-data";

/// Topic carrying the derived RSI stream relayed to subscribers.
pub const RSI_TOPIC: &str = "rsi-data";

// =============================================================================
// Payload
// =============================================================================

/// Opaque, cheaply clonable message payload.
///
/// Cloning shares the underlying buffer, so fanning one payload out to
/// many subscribers never copies the bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Copy a borrowed slice into a new payload.
    #[must_use]
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Shared handle to the underlying buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "Payload({text:?})"),
            None => write!(f, "Payload({} bytes)", self.len()),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

// =============================================================================
// Log Message
// =============================================================================

/// A message delivered by the log client.
///
/// Immutable once received. The offset is informational; the relay never
/// persists it beyond handing it back to the consumer for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Message body, absent for tombstones.
    pub payload: Option<Payload>,
}

impl LogMessage {
    /// Create a message.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: Option<Payload>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload,
        }
    }

    /// The payload if present and non-empty.
    #[must_use]
    pub fn deliverable_payload(&self) -> Option<&Payload> {
        self.payload.as_ref().filter(|p| !p.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================

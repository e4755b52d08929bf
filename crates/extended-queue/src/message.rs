//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token proving the current lease on a retrieved message.
///
/// Backends may hand out a fresh receipt on every visibility update; only
/// the latest one is valid for further updates or deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String) -> Self {
        Self(handle)
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Time elapsed since this timestamp, zero if it lies in the future
    pub fn elapsed(&self) -> Duration {
        let elapsed = Utc::now() - self.0;
        if elapsed < Duration::zero() {
            Duration::zero()
        } else {
            elapsed
        }
    }

    /// Time remaining until this timestamp, zero if it has passed
    pub fn remaining(&self) -> Duration {
        let remaining = self.0 - Utc::now();
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message as returned by the queue backend
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub receipt: ReceiptHandle,
    pub body: Bytes,
    pub dequeue_count: u32,
    pub insertion_time: Timestamp,
    pub next_visible_time: Timestamp,
}

/// Result of extending a message's visibility timeout
#[derive(Debug, Clone)]
pub struct VisibilityUpdate {
    pub receipt: ReceiptHandle,
    pub next_visible_time: Timestamp,
}

/// Envelope over a retrieved message, carrying its lease and overflow state.
///
/// Created when the message is retrieved. The overflow key and flag are
/// filled in once the body has been resolved against the overflow store.
#[derive(Debug, Clone)]
pub struct QueueMessageWrapper {
    id: MessageId,
    receipt: ReceiptHandle,
    body: Bytes,
    dequeue_count: u32,
    insertion_time: Timestamp,
    next_visible_time: Timestamp,
    overflow_key: Option<String>,
    was_overflown: bool,
}

impl QueueMessageWrapper {
    /// Wrap a message retrieved from the backend
    pub fn from_raw(raw: RawMessage) -> Self {
        Self {
            id: raw.id,
            receipt: raw.receipt,
            body: raw.body,
            dequeue_count: raw.dequeue_count,
            insertion_time: raw.insertion_time,
            next_visible_time: raw.next_visible_time,
            overflow_key: None,
            was_overflown: false,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn receipt(&self) -> &ReceiptHandle {
        &self.receipt
    }

    /// Raw body as stored in the queue (inline contents or overflow pointer)
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn dequeue_count(&self) -> u32 {
        self.dequeue_count
    }

    pub fn insertion_time(&self) -> Timestamp {
        self.insertion_time
    }

    pub fn next_visible_time(&self) -> Timestamp {
        self.next_visible_time
    }

    /// Key of the blob holding the real payload, if the message overflowed
    pub fn overflow_key(&self) -> Option<&str> {
        self.overflow_key.as_deref()
    }

    pub fn was_overflown(&self) -> bool {
        self.was_overflown
    }

    /// How long the message has been in the queue
    pub fn age(&self) -> Duration {
        self.insertion_time.elapsed()
    }

    /// Check whether the message is older than the given time window.
    ///
    /// A zero window disables the check.
    pub fn is_older_than(&self, time_window: std::time::Duration) -> bool {
        if time_window.is_zero() {
            return false;
        }

        match Duration::from_std(time_window) {
            Ok(window) => self.age() > window,
            Err(_) => false,
        }
    }

    /// Check whether the dequeue count exceeds the poison threshold
    pub fn exceeds_dequeue_threshold(&self, threshold: u32) -> bool {
        self.dequeue_count > threshold
    }

    pub(crate) fn set_overflow(&mut self, key: Option<String>) {
        self.was_overflown = key.is_some();
        self.overflow_key = key;
    }
}

/// A retrieved message together with its decoded contents
#[derive(Debug, Clone)]
pub struct DecodedMessage<T> {
    message: QueueMessageWrapper,
    contents: T,
}

impl<T> DecodedMessage<T> {
    pub fn new(message: QueueMessageWrapper, contents: T) -> Self {
        Self { message, contents }
    }

    pub fn id(&self) -> &MessageId {
        self.message.id()
    }

    /// The underlying queue message
    pub fn message(&self) -> &QueueMessageWrapper {
        &self.message
    }

    pub fn contents(&self) -> &T {
        &self.contents
    }

    pub fn into_contents(self) -> T {
        self.contents
    }

    pub fn into_parts(self) -> (QueueMessageWrapper, T) {
        (self.message, self.contents)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

//! Capability traits consumed by the extended queue.
//!
//! Concrete cloud backends live outside this crate; the `providers` module
//! contains in-memory and filesystem implementations for development and
//! testing.

use crate::error::{QueueError, StorageError};
use crate::message::{MessageId, RawMessage, ReceiptHandle, VisibilityUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Operations of a visibility-timeout message queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Name of the queue, used for logging and overflow key prefixes
    fn name(&self) -> &str;

    /// Add a message body to the queue
    async fn add(&self, body: Bytes) -> Result<MessageId, QueueError>;

    /// Retrieve up to `count` messages, hiding them for `visibility_timeout`.
    ///
    /// Implementations may reject counts above their per-request maximum.
    async fn get(
        &self,
        count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError>;

    /// Extend the visibility timeout of a retrieved message
    async fn update_visibility(
        &self,
        id: &MessageId,
        receipt: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<VisibilityUpdate, QueueError>;

    /// Permanently remove a retrieved message
    async fn delete(&self, id: &MessageId, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}

/// Key/value blob storage used for overflown payloads
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store contents under a key, replacing anything already there
    async fn put(&self, key: &str, contents: Bytes) -> Result<(), StorageError>;

    /// Read the contents stored under a key.
    ///
    /// Returns `StorageError::BlobNotFound` when nothing is stored there.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Remove the contents stored under a key
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Maximum size in bytes of a single message body the backend accepts
pub trait MaxMessageSizeProvider: Send + Sync {
    fn max_message_size(&self) -> usize;
}

/// Maximum number of messages the backend returns from a single `get`
pub trait MaxBatchSizeProvider: Send + Sync {
    fn max_batch_size(&self) -> u32;
}

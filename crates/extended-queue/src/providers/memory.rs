//! In-memory queue and blob store implementations for testing and development.
//!
//! The queue implements real visibility-timeout semantics:
//! - Retrieved messages stay hidden until their visibility timeout expires
//! - Every retrieval increments the dequeue count and rotates the receipt
//! - Updates and deletes with a stale receipt fail with `MessageNotFound`
//!
//! Visibility deadlines use `tokio::time::Instant`, so tests running with a
//! paused clock observe redelivery as soon as the clock is advanced.

use crate::client::{BlobStore, QueueClient};
use crate::error::{QueueError, StorageError};
use crate::message::{MessageId, RawMessage, ReceiptHandle, Timestamp, VisibilityUpdate};
use crate::provider::{ProviderLimits, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
struct StoredMessage {
    id: MessageId,
    body: Bytes,
    dequeue_count: u32,
    inserted_at: Timestamp,
    visible_at: Instant,
    next_visible_time: Timestamp,
    receipt: Option<ReceiptHandle>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        now >= self.visible_at
    }

    fn holds_receipt(&self, receipt: &ReceiptHandle) -> bool {
        self.receipt.as_ref() == Some(receipt)
    }

    fn lease(&mut self, visibility_timeout: Duration) -> (ReceiptHandle, Timestamp) {
        let receipt = ReceiptHandle::new(uuid::Uuid::new_v4().to_string());
        let next_visible_time = Timestamp::from_datetime(
            Utc::now()
                + chrono::Duration::from_std(visibility_timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        );

        self.visible_at = Instant::now() + visibility_timeout;
        self.next_visible_time = next_visible_time;
        self.receipt = Some(receipt.clone());

        (receipt, next_visible_time)
    }
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// In-memory visibility-timeout queue
pub struct InMemoryQueue {
    name: String,
    limits: ProviderLimits,
    messages: Mutex<VecDeque<StoredMessage>>,
}

impl InMemoryQueue {
    /// Create new in-memory queue with the in-memory provider limits
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limits(name, ProviderType::InMemory.into())
    }

    /// Create new in-memory queue enforcing custom limits
    pub fn with_limits(name: impl Into<String>, limits: ProviderLimits) -> Self {
        Self {
            name: name.into(),
            limits,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limits(&self) -> ProviderLimits {
        self.limits
    }

    /// Add a message with an explicit insertion time
    pub fn add_with_insertion_time(
        &self,
        body: Bytes,
        inserted_at: Timestamp,
    ) -> Result<MessageId, QueueError> {
        if body.len() > self.limits.max_message_size {
            return Err(QueueError::MessageTooLarge {
                size: body.len(),
                max_size: self.limits.max_message_size,
            });
        }

        let id = MessageId::new();
        let mut messages = self.lock_messages()?;
        messages.push_back(StoredMessage {
            id: id.clone(),
            body,
            dequeue_count: 0,
            inserted_at,
            visible_at: Instant::now(),
            next_visible_time: Timestamp::now(),
            receipt: None,
        });

        Ok(id)
    }

    /// Number of messages in the queue, visible or not
    pub fn message_count(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Number of messages that a `get` would currently return
    pub fn visible_message_count(&self) -> usize {
        let now = Instant::now();
        self.messages
            .lock()
            .map(|m| m.iter().filter(|msg| msg.is_visible(now)).count())
            .unwrap_or(0)
    }

    /// Bodies of all stored messages in queue order
    pub fn peek_bodies(&self) -> Vec<Bytes> {
        self.messages
            .lock()
            .map(|m| m.iter().map(|msg| msg.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Current dequeue count of a stored message
    pub fn dequeue_count(&self, id: &MessageId) -> Option<u32> {
        self.messages.lock().ok().and_then(|m| {
            m.iter()
                .find(|msg| &msg.id == id)
                .map(|msg| msg.dequeue_count)
        })
    }

    fn lock_messages(&self) -> Result<MutexGuard<'_, VecDeque<StoredMessage>>, QueueError> {
        self.messages.lock().map_err(|_| QueueError::ProviderError {
            provider: "InMemory".to_string(),
            code: "LockPoisoned".to_string(),
            message: format!("queue '{}' state is unavailable", self.name),
        })
    }

    fn not_found(id: &MessageId) -> QueueError {
        QueueError::MessageNotFound {
            message_id: id.to_string(),
        }
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, body: Bytes) -> Result<MessageId, QueueError> {
        self.add_with_insertion_time(body, Timestamp::now())
    }

    async fn get(
        &self,
        count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        if count > self.limits.max_batch_size {
            return Err(QueueError::BatchTooLarge {
                size: count as usize,
                max_size: self.limits.max_batch_size as usize,
            });
        }

        let now = Instant::now();
        let mut messages = self.lock_messages()?;
        let mut retrieved = Vec::new();

        for stored in messages.iter_mut() {
            if retrieved.len() >= count as usize {
                break;
            }
            if !stored.is_visible(now) {
                continue;
            }

            stored.dequeue_count += 1;
            let (receipt, next_visible_time) = stored.lease(visibility_timeout);

            retrieved.push(RawMessage {
                id: stored.id.clone(),
                receipt,
                body: stored.body.clone(),
                dequeue_count: stored.dequeue_count,
                insertion_time: stored.inserted_at,
                next_visible_time,
            });
        }

        Ok(retrieved)
    }

    async fn update_visibility(
        &self,
        id: &MessageId,
        receipt: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<VisibilityUpdate, QueueError> {
        let mut messages = self.lock_messages()?;
        let stored = messages
            .iter_mut()
            .find(|msg| &msg.id == id && msg.holds_receipt(receipt))
            .ok_or_else(|| Self::not_found(id))?;

        let (receipt, next_visible_time) = stored.lease(visibility_timeout);
        Ok(VisibilityUpdate {
            receipt,
            next_visible_time,
        })
    }

    async fn delete(&self, id: &MessageId, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut messages = self.lock_messages()?;
        let position = messages
            .iter()
            .position(|msg| &msg.id == id && msg.holds_receipt(receipt))
            .ok_or_else(|| Self::not_found(id))?;

        messages.remove(position);
        Ok(())
    }
}

// ============================================================================
// InMemoryBlobStore
// ============================================================================

/// In-memory blob store
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Keys of all stored blobs
    pub fn keys(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Size in bytes of the blob stored under a key
    pub fn blob_size(&self, key: &str) -> Option<usize> {
        self.blobs
            .lock()
            .ok()
            .and_then(|b| b.get(key).map(|contents| contents.len()))
    }

    fn lock_blobs(&self) -> Result<MutexGuard<'_, HashMap<String, Bytes>>, StorageError> {
        self.blobs.lock().map_err(|_| StorageError::InternalError {
            message: "blob store state is unavailable".to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, contents: Bytes) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }

        self.lock_blobs()?.insert(key.to_string(), contents);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.lock_blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock_blobs()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::BlobNotFound {
                key: key.to_string(),
            })
    }
}

//! Relocation of oversized payloads to blob storage.
//!
//! When an encoded message exceeds the backend's maximum size, the full bytes
//! are written to the blob store and the queue receives a short pointer
//! record instead:
//!
//! ```text
//! \0xq-overflow:<queue-name>/<ULID>
//! ```
//!
//! The leading NUL byte never appears in UTF-8 text produced by the
//! serializers, so inline bodies and pointer records cannot be confused.

use crate::client::{BlobStore, MaxMessageSizeProvider};
use crate::error::{OverflowError, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};
use ulid::Ulid;

#[cfg(test)]
#[path = "overflow_tests.rs"]
mod tests;

/// Prefix identifying a pointer record
pub const OVERFLOW_MARKER: &[u8] = b"\0xq-overflow:";

/// Build the pointer record for an overflow key
pub fn pointer_record(key: &str) -> Bytes {
    let mut record = Vec::with_capacity(OVERFLOW_MARKER.len() + key.len());
    record.extend_from_slice(OVERFLOW_MARKER);
    record.extend_from_slice(key.as_bytes());
    Bytes::from(record)
}

/// Moves payloads between the queue and the overflow blob store
#[derive(Clone)]
pub struct OverflowManager {
    store: Arc<dyn BlobStore>,
    size_provider: Arc<dyn MaxMessageSizeProvider>,
}

impl OverflowManager {
    pub fn new(
        store: Arc<dyn BlobStore>,
        size_provider: Arc<dyn MaxMessageSizeProvider>,
    ) -> Self {
        Self {
            store,
            size_provider,
        }
    }

    /// Maximum inline body size accepted by the backend
    pub fn max_message_size(&self) -> usize {
        self.size_provider.max_message_size()
    }

    /// Return the bytes to put on the queue.
    ///
    /// Bodies within the size limit are returned unchanged. Larger bodies are
    /// stored under a fresh `{queue_name}/{ULID}` key and replaced by a
    /// pointer record.
    pub async fn put_if_oversized(
        &self,
        queue_name: &str,
        encoded: Bytes,
    ) -> Result<Bytes, OverflowError> {
        let max_size = self.max_message_size();
        if encoded.len() <= max_size {
            return Ok(encoded);
        }

        let key = format!("{}/{}", queue_name, Ulid::new());
        let size = encoded.len();

        self.store
            .put(&key, encoded)
            .await
            .map_err(|source| OverflowError::StoreFailed {
                key: key.clone(),
                source,
            })?;

        debug!(
            queue = %queue_name,
            overflow_key = %key,
            size = size,
            max_size = max_size,
            "Message body relocated to overflow store"
        );

        Ok(pointer_record(&key))
    }

    /// Inspect a queue body and return the overflow key if it is a pointer
    pub fn resolve(&self, body: &[u8]) -> Result<Option<String>, OverflowError> {
        let Some(raw_key) = body.strip_prefix(OVERFLOW_MARKER) else {
            return Ok(None);
        };

        match std::str::from_utf8(raw_key) {
            Ok(key) if !key.is_empty() => Ok(Some(key.to_string())),
            _ => Err(OverflowError::InvalidOverflowPointer),
        }
    }

    /// Read overflown contents
    pub async fn fetch(&self, key: &str) -> Result<Bytes, OverflowError> {
        self.store
            .get(key)
            .await
            .map_err(|source| OverflowError::OverflowContentUnavailable {
                key: key.to_string(),
                source,
            })
    }

    /// Resolve a queue body into the encoded payload and its overflow key
    pub async fn load(&self, body: &Bytes) -> Result<(Bytes, Option<String>), OverflowError> {
        match self.resolve(body)? {
            Some(key) => {
                let contents = self.fetch(&key).await?;
                Ok((contents, Some(key)))
            }
            None => Ok((body.clone(), None)),
        }
    }

    /// Delete overflown contents once the message is gone.
    ///
    /// A blob that is already missing counts as cleaned up.
    pub async fn cleanup(&self, key: &str) -> Result<(), OverflowError> {
        match self.store.delete(key).await {
            Ok(()) => Ok(()),
            Err(StorageError::BlobNotFound { .. }) => {
                warn!(overflow_key = %key, "Overflow blob already removed");
                Ok(())
            }
            Err(source) => Err(OverflowError::CleanupFailed {
                key: key.to_string(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for OverflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowManager")
            .field("max_message_size", &self.max_message_size())
            .finish()
    }
}

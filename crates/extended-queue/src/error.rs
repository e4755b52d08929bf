//! Error types for queue, blob storage, codec and processing operations.

use chrono::Duration;
use thiserror::Error;

/// Errors raised by the underlying queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or receipt expired: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },
}

impl QueueError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::BatchTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
        }
    }

    /// Check if the message behind a receipt no longer exists.
    ///
    /// During lease renewal this is the expected outcome of a race with the
    /// processing path having already acknowledged the message.
    pub fn is_message_not_found(&self) -> bool {
        matches!(self, Self::MessageNotFound { .. })
    }
}

/// Errors raised by the blob store that holds overflown payloads
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Blob not found: {key}")]
    BlobNotFound { key: String },

    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },

    #[error("Invalid blob key: {key}")]
    InvalidKey { key: String },

    #[error("Network timeout: {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Check if error is transient and worth retrying
    ///
    /// Connection failures, timeouts and internal errors may resolve on their
    /// own. Missing blobs, invalid keys and permission problems will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::InternalError { .. }
        )
    }
}

/// Errors during entity serialization and byte transforms
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Transform '{transform}' failed: {message}")]
    Transform { transform: String, message: String },

    #[error("Decoded contents could not be converted to the requested type")]
    TypeMismatch,
}

/// Errors while moving payloads between the queue and the overflow store
#[derive(Debug, Error)]
pub enum OverflowError {
    #[error("Overflow pointer is malformed")]
    InvalidOverflowPointer,

    #[error("Overflown contents for '{key}' could not be read: {source}")]
    OverflowContentUnavailable {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to store overflown contents for '{key}': {source}")]
    StoreFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to remove overflown contents for '{key}': {source}")]
    CleanupFailed {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Errors raised while constructing processing options
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Errors while loading processing settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(#[from] ValidationError),
}

/// Classified failure of a single message's processing.
///
/// Storage failures come from the queue, the blob store or the overflow
/// layer. Everything else (codec failures, handler errors and panics) is a
/// general failure. Neither ever stops the processing loop.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Blob storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Overflow handling failed: {0}")]
    Overflow(#[from] OverflowError),

    #[error("Message could not be decoded: {0}")]
    Codec(#[from] CodecError),

    #[error("Message handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    #[error("Message handler panicked: {message}")]
    HandlerPanicked { message: String },
}

impl ProcessingError {
    /// Check if the failure originated in the storage layer
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Queue(_) | Self::Storage(_) | Self::Overflow(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

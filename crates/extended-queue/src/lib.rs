//! # Extended Queue
//!
//! Reliable message processing on top of simple visibility-timeout queues.
//!
//! This library provides:
//! - Transparent overflow of oversized payloads to blob storage
//! - Background lease renewal for messages that take long to handle
//! - Poison message detection based on dequeue counts
//! - Discarding of messages older than a configurable time window
//! - Serial, bounded-parallel and batch processing strategies
//! - A pluggable codec with gzip and base64 transforms
//!
//! Concrete cloud backends are consumed through the [`QueueClient`] and
//! [`BlobStore`] traits. In-memory and filesystem implementations live in
//! [`providers`].
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue, storage and processing operations
//! - [`message`] - Message identifiers, wrappers and decoded messages
//! - [`client`] - Capability traits consumed by the engine
//! - [`provider`] - Backend size limits
//! - [`codec`] - Entity serialization and byte transforms
//! - [`overflow`] - Blob overflow of oversized payloads
//! - [`keep_alive`] - Lease renewal
//! - [`options`], [`handlers`], [`settings`] - Processing configuration
//! - [`queue`] - The processing engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use extended_queue::{
//!     ExtendedQueueFactory, ProcessingOptions, ProviderLimits, SerialOptions,
//!     providers::{InMemoryBlobStore, InMemoryQueue},
//!     message::DecodedMessage,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ExtendedQueueFactory::new(
//!     Arc::new(InMemoryBlobStore::new()),
//!     ProviderLimits::default(),
//! );
//! let queue = factory.create(Arc::new(InMemoryQueue::new("orders")));
//!
//! queue.add_message_entity(&"hello".to_string()).await?;
//!
//! let options = ProcessingOptions::new(
//!     Duration::ZERO,
//!     Duration::from_secs(30),
//!     Duration::from_secs(1),
//!     5,
//!     CancellationToken::new(),
//! )?;
//! queue
//!     .handle_messages(SerialOptions::new(
//!         options,
//!         |message: DecodedMessage<String>| async move {
//!             println!("{}", message.contents());
//!             anyhow::Ok(true)
//!         },
//!     ))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod exceptions;
pub mod handlers;
pub mod keep_alive;
pub mod message;
pub mod options;
pub mod overflow;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod settings;
pub mod statistics;

// Re-export commonly used types at crate root for convenience
pub use client::{BlobStore, MaxBatchSizeProvider, MaxMessageSizeProvider, QueueClient};
pub use codec::{
    Base64Transform, ByteTransform, Codec, GzipTransform, JsonSerializer, Serializer,
    YamlSerializer,
};
pub use error::{
    CodecError, OverflowError, ProcessingError, QueueError, SettingsError, StorageError,
    ValidationError,
};
pub use exceptions::ExceptionHandler;
pub use handlers::{BatchHandler, MessageHandler, PoisonHandler};
pub use message::{DecodedMessage, MessageId, QueueMessageWrapper, ReceiptHandle, Timestamp};
pub use options::{BatchOptions, ParallelOptions, ProcessingOptions, SerialOptions};
pub use provider::{ProviderLimits, ProviderType};
pub use queue::{ExtendedQueue, ExtendedQueueFactory};
pub use settings::ProcessingSettings;
pub use statistics::{QueueStatistics, StatisticsSnapshot};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

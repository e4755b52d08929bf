//! Common test utilities for extended-queue integration tests
//!
//! This module provides:
//! - A harness wiring an extended queue to in-memory backends
//! - Helpers for running a strategy for a fixed amount of (paused) time
//! - Shared payload types

use extended_queue::{
    providers::{InMemoryBlobStore, InMemoryQueue},
    BatchOptions, BlobStore, Codec, ExtendedQueue, ExtendedQueueFactory, ParallelOptions,
    ProcessingOptions, ProviderLimits, SerialOptions,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Visibility timeout used by every harness
#[allow(dead_code)]
pub const LEASE: Duration = Duration::from_secs(30);

/// Payload used across the integration tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub index: usize,
    pub text: String,
}

impl Job {
    #[allow(dead_code)]
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Extended queue over an in-memory queue
pub struct Harness {
    pub client: Arc<InMemoryQueue>,
    pub queue: ExtendedQueue,
    pub cancel: CancellationToken,
}

#[allow(dead_code)]
impl Harness {
    /// Harness with in-memory provider limits and an in-memory blob store
    pub fn new(name: &str) -> (Self, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let harness = Self::with_store(
            name,
            blobs.clone(),
            ProviderLimits::default(),
            Codec::new(),
        );
        (harness, blobs)
    }

    /// Harness with explicit backends, limits and codec
    pub fn with_store(
        name: &str,
        blobs: Arc<dyn BlobStore>,
        limits: ProviderLimits,
        codec: Codec,
    ) -> Self {
        let client = Arc::new(InMemoryQueue::with_limits(name, limits));
        let queue = ExtendedQueueFactory::new(blobs, limits)
            .with_codec(codec)
            .create(client.clone());

        Self {
            client,
            queue,
            cancel: CancellationToken::new(),
        }
    }

    /// Base options with no time window and a one second poll frequency
    pub fn options(&self, poison_threshold: u32) -> ProcessingOptions {
        self.options_with_window(Duration::ZERO, poison_threshold)
    }

    pub fn options_with_window(
        &self,
        time_window: Duration,
        poison_threshold: u32,
    ) -> ProcessingOptions {
        ProcessingOptions::new(
            time_window,
            LEASE,
            Duration::from_secs(1),
            poison_threshold,
            self.cancel.clone(),
        )
        .expect("valid processing options")
    }

    /// Run the serial strategy for `duration`, then cancel and wait for it
    pub async fn run_serial<T>(&self, options: SerialOptions<T>, duration: Duration)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let queue = self.queue.clone();
        self.run_for(duration, async move { queue.handle_messages(options).await })
            .await;
    }

    pub async fn run_parallel<T>(&self, options: ParallelOptions<T>, duration: Duration)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let queue = self.queue.clone();
        self.run_for(duration, async move {
            queue.handle_messages_in_parallel(options).await
        })
        .await;
    }

    pub async fn run_batch<T>(&self, options: BatchOptions<T>, duration: Duration)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let queue = self.queue.clone();
        self.run_for(duration, async move { queue.handle_messages_in_batch(options).await })
            .await;
    }

    async fn run_for<F>(&self, duration: Duration, strategy: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(strategy);
        tokio::time::sleep(duration).await;
        self.cancel.cancel();
        handle.await.expect("strategy task should not panic");
    }
}

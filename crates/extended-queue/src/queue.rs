//! # Extended Queue
//!
//! The processing engine. An [`ExtendedQueue`] wraps a [`QueueClient`] and
//! adds payload overflow, poison detection, stale-message discarding and
//! lease renewal on top of it.
//!
//! Every strategy runs the same loop until its cancellation token fires:
//!
//! 1. Retrieve messages with the configured lease time
//! 2. Wait the poll frequency when nothing came back
//! 3. Per message: discard if stale, divert to the poison handler if the
//!    dequeue count crossed the threshold, otherwise decode and hand it to
//!    the handler while its lease is renewed in the background
//! 4. Delete acknowledged messages and clean up their overflow blobs
//!
//! Failures of a single message are routed through the exception handler and
//! leave the message for redelivery. They never stop the loop.

use crate::client::{BlobStore, MaxBatchSizeProvider, MaxMessageSizeProvider, QueueClient};
use crate::codec::Codec;
use crate::error::ProcessingError;
use crate::exceptions::{panic_message, ExceptionRouter};
use crate::handlers::PoisonHandler;
use crate::keep_alive::{KeepAliveGuard, Lease, RenewalSchedule};
use crate::message::{DecodedMessage, MessageId, QueueMessageWrapper};
use crate::options::{BatchOptions, ParallelOptions, ProcessingOptions, SerialOptions};
use crate::overflow::OverflowManager;
use crate::provider::ProviderLimits;
use crate::statistics::{QueueStatistics, StatisticsSnapshot};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// ============================================================================
// Factory
// ============================================================================

/// Builds extended queues that share an overflow store, limits and codec
#[derive(Clone)]
pub struct ExtendedQueueFactory {
    blob_store: Arc<dyn BlobStore>,
    message_size: Arc<dyn MaxMessageSizeProvider>,
    batch_size: Arc<dyn MaxBatchSizeProvider>,
    codec: Codec,
}

impl ExtendedQueueFactory {
    /// Create a factory enforcing fixed provider limits
    pub fn new(blob_store: Arc<dyn BlobStore>, limits: ProviderLimits) -> Self {
        let limits = Arc::new(limits);
        Self::with_size_providers(blob_store, limits.clone(), limits)
    }

    /// Create a factory that asks the given providers for the limits
    pub fn with_size_providers(
        blob_store: Arc<dyn BlobStore>,
        message_size: Arc<dyn MaxMessageSizeProvider>,
        batch_size: Arc<dyn MaxBatchSizeProvider>,
    ) -> Self {
        Self {
            blob_store,
            message_size,
            batch_size,
            codec: Codec::new(),
        }
    }

    /// Use `codec` for every queue created afterwards
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Wrap a queue client
    pub fn create(&self, client: Arc<dyn QueueClient>) -> ExtendedQueue {
        ExtendedQueue {
            inner: Arc::new(Inner {
                client,
                overflow: OverflowManager::new(self.blob_store.clone(), self.message_size.clone()),
                batch_size: self.batch_size.clone(),
                codec: self.codec.clone(),
                statistics: Arc::new(QueueStatistics::new()),
            }),
        }
    }
}

impl std::fmt::Debug for ExtendedQueueFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedQueueFactory")
            .field("max_message_size", &self.message_size.max_message_size())
            .field("max_batch_size", &self.batch_size.max_batch_size())
            .field("codec", &self.codec)
            .finish()
    }
}

// ============================================================================
// Extended Queue
// ============================================================================

struct Inner {
    client: Arc<dyn QueueClient>,
    overflow: OverflowManager,
    batch_size: Arc<dyn MaxBatchSizeProvider>,
    codec: Codec,
    statistics: Arc<QueueStatistics>,
}

/// Reliability layer over a visibility-timeout queue.
///
/// Cheap to clone; clones share the client, the overflow store and the
/// statistics.
#[derive(Clone)]
pub struct ExtendedQueue {
    inner: Arc<Inner>,
}

impl ExtendedQueue {
    pub fn name(&self) -> &str {
        self.inner.client.name()
    }

    /// Live counters of this queue
    pub fn statistics(&self) -> &Arc<QueueStatistics> {
        &self.inner.statistics
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    /// Encode an entity and add it to the queue, overflowing it to the blob
    /// store when it exceeds the backend's message size
    pub async fn add_message_entity<T>(&self, entity: &T) -> Result<MessageId, ProcessingError>
    where
        T: Serialize + Any,
    {
        let encoded = self.inner.codec.encode(entity)?;
        let body = self
            .inner
            .overflow
            .put_if_oversized(self.name(), encoded)
            .await?;

        match self.inner.client.add(body.clone()).await {
            Ok(id) => {
                debug!(queue = %self.name(), message_id = %id, "Message added");
                Ok(id)
            }
            Err(e) => {
                if let Some(key) = self.pointer_key(&body) {
                    if let Err(cleanup_error) = self.inner.overflow.cleanup(&key).await {
                        warn!(
                            queue = %self.name(),
                            overflow_key = %key,
                            error = %cleanup_error,
                            "Failed to remove overflow blob of rejected message"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Decode a retrieved message, fetching overflown contents if needed.
    ///
    /// Records the overflow key on the wrapper so the blob can be cleaned up
    /// once the message is acknowledged.
    pub async fn decode_message<T>(
        &self,
        message: &mut QueueMessageWrapper,
    ) -> Result<T, ProcessingError>
    where
        T: DeserializeOwned + Any,
    {
        let (payload, overflow_key) = self.inner.overflow.load(message.body()).await?;
        message.set_overflow(overflow_key);
        Ok(self.inner.codec.decode(payload)?)
    }

    // ------------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------------

    /// Process one message at a time, in retrieval order, until cancelled
    pub async fn handle_messages<T>(&self, options: SerialOptions<T>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let base = options.base();
        let cancel = base.cancellation_token().clone();
        let router = self.router(base);

        info!(queue = %self.name(), strategy = "serial", "Message processing started");

        while !cancel.is_cancelled() {
            let messages = tokio::select! {
                _ = cancel.cancelled() => break,
                messages = self.retrieve(1, base.message_lease_time(), &router) => messages,
            };

            if messages.is_empty() {
                if !self.idle_wait(base).await {
                    break;
                }
                continue;
            }

            for message in messages {
                self.process_message(message, &options, &router).await;
            }
        }

        info!(queue = %self.name(), strategy = "serial", "Message processing stopped");
    }

    /// Process up to `max_concurrency` messages at once until cancelled.
    ///
    /// In-flight messages are finished before the call returns.
    pub async fn handle_messages_in_parallel<T>(&self, options: ParallelOptions<T>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let base = options.base();
        let cancel = base.cancellation_token().clone();
        let router = self.router(base);
        let serial = Arc::new(options.serial().clone());
        let max_concurrency = options.max_concurrency();
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut tasks = JoinSet::new();

        info!(
            queue = %self.name(),
            strategy = "parallel",
            max_concurrency = max_concurrency,
            "Message processing started"
        );

        while !cancel.is_cancelled() {
            reap_finished(&mut tasks, self.name());

            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let mut permits = vec![first];
            while permits.len() < max_concurrency {
                match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            let messages = tokio::select! {
                _ = cancel.cancelled() => break,
                messages = self.retrieve(
                    permits.len() as u32,
                    base.message_lease_time(),
                    &router,
                ) => messages,
            };

            if messages.is_empty() {
                drop(permits);
                if !self.idle_wait(base).await {
                    break;
                }
                continue;
            }

            for (message, permit) in messages.into_iter().zip(permits) {
                let queue = self.clone();
                let serial = serial.clone();
                let router = router.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    queue.process_message(message, &serial, &router).await;
                });
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(
                queue = %self.name(),
                in_flight = in_flight,
                "Waiting for in-flight messages to finish"
            );
        }
        while let Some(result) = tasks.join_next().await {
            log_join_error(result, self.name());
        }

        info!(queue = %self.name(), strategy = "parallel", "Message processing stopped");
    }

    /// Hand batches of up to `batch_size` messages to the batch handler until
    /// cancelled
    pub async fn handle_messages_in_batch<T>(&self, options: BatchOptions<T>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let base = options.base();
        let cancel = base.cancellation_token().clone();
        let router = self.router(base);

        info!(
            queue = %self.name(),
            strategy = "batch",
            batch_size = options.batch_size(),
            "Message processing started"
        );

        while !cancel.is_cancelled() {
            let messages = tokio::select! {
                _ = cancel.cancelled() => break,
                messages = self.retrieve(
                    options.batch_size(),
                    base.message_lease_time(),
                    &router,
                ) => messages,
            };

            if messages.is_empty() {
                if !self.idle_wait(base).await {
                    break;
                }
                continue;
            }

            self.process_batch(messages, &options, &router).await;
        }

        info!(queue = %self.name(), strategy = "batch", "Message processing stopped");
    }

    // ------------------------------------------------------------------------
    // Per-message pipeline
    // ------------------------------------------------------------------------

    async fn process_message<T>(
        &self,
        mut message: QueueMessageWrapper,
        options: &SerialOptions<T>,
        router: &ExceptionRouter,
    ) where
        T: DeserializeOwned + Send + 'static,
    {
        let base = options.base();
        let lease = Lease::single(&message);

        if message.is_older_than(base.time_window()) {
            self.discard_stale(&lease, &message, router).await;
            return;
        }

        let keeper = self.start_keeper(&lease, base, RenewalSchedule::Single);

        if message.exceeds_dequeue_threshold(base.poison_threshold()) {
            self.handle_poison(&lease, message, options.poison_handler(), router)
                .await;
            keeper.stop().await;
            return;
        }

        let contents: T = match self.decode_message(&mut message).await {
            Ok(contents) => contents,
            Err(e) => {
                keeper.stop().await;
                router.route(Some(message.id()), &e);
                return;
            }
        };

        let id = message.id().clone();
        let overflow_key = message.overflow_key().map(str::to_string);
        let outcome = AssertUnwindSafe(
            options
                .handler()
                .handle(DecodedMessage::new(message, contents)),
        )
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(true)) => {
                if self.remove(&lease, &id, overflow_key, router).await {
                    self.inner.statistics.record_handled();
                    debug!(queue = %self.name(), message_id = %id, "Message acknowledged");
                }
            }
            Ok(Ok(false)) => {
                debug!(
                    queue = %self.name(),
                    message_id = %id,
                    "Message not acknowledged, left for redelivery"
                );
            }
            Ok(Err(e)) => router.route(Some(&id), &ProcessingError::Handler(e)),
            Err(payload) => router.route(
                Some(&id),
                &ProcessingError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                },
            ),
        }

        keeper.stop().await;
    }

    async fn process_batch<T>(
        &self,
        messages: Vec<QueueMessageWrapper>,
        options: &BatchOptions<T>,
        router: &ExceptionRouter,
    ) where
        T: DeserializeOwned + Send + 'static,
    {
        let base = options.base();
        let lease = Lease::batch(&messages);
        let keeper = self.start_keeper(&lease, base, RenewalSchedule::Batch);

        let mut decoded = Vec::with_capacity(messages.len());
        let mut overflow_keys = HashMap::with_capacity(messages.len());

        for mut message in messages {
            if message.is_older_than(base.time_window()) {
                self.discard_stale(&lease, &message, router).await;
                continue;
            }

            if message.exceeds_dequeue_threshold(base.poison_threshold()) {
                let id = message.id().clone();
                self.handle_poison(&lease, message, options.poison_handler(), router)
                    .await;
                lease.release(&id).await;
                continue;
            }

            match self.decode_message::<T>(&mut message).await {
                Ok(contents) => {
                    overflow_keys.insert(
                        message.id().clone(),
                        message.overflow_key().map(str::to_string),
                    );
                    decoded.push(DecodedMessage::new(message, contents));
                }
                Err(e) => {
                    lease.release(message.id()).await;
                    router.route(Some(message.id()), &e);
                }
            }
        }

        if decoded.is_empty() {
            keeper.stop().await;
            return;
        }

        let batch_len = decoded.len();
        let outcome = AssertUnwindSafe(options.handler().handle(decoded))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(acknowledged)) => {
                let mut removed = 0;
                for id in acknowledged {
                    let Some(overflow_key) = overflow_keys.remove(&id) else {
                        warn!(
                            queue = %self.name(),
                            message_id = %id,
                            "Batch handler acknowledged a message outside the batch"
                        );
                        continue;
                    };

                    if self.remove(&lease, &id, overflow_key, router).await {
                        self.inner.statistics.record_handled();
                        removed += 1;
                    }
                }

                debug!(
                    queue = %self.name(),
                    batch_len = batch_len,
                    acknowledged = removed,
                    "Batch processed"
                );
            }
            Ok(Err(e)) => router.route(None, &ProcessingError::Handler(e)),
            Err(payload) => router.route(
                None,
                &ProcessingError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                },
            ),
        }

        keeper.stop().await;
    }

    /// Delete a message older than the time window without handling it
    async fn discard_stale(
        &self,
        lease: &Lease,
        message: &QueueMessageWrapper,
        router: &ExceptionRouter,
    ) {
        info!(
            queue = %self.name(),
            message_id = %message.id(),
            age_secs = message.age().num_seconds(),
            "Discarding message older than the time window"
        );

        self.inner.statistics.record_stale();
        self.remove(lease, message.id(), self.pointer_key(message.body()), router)
            .await;
    }

    async fn handle_poison(
        &self,
        lease: &Lease,
        message: QueueMessageWrapper,
        poison_handler: Option<&Arc<dyn PoisonHandler>>,
        router: &ExceptionRouter,
    ) {
        self.inner.statistics.record_poison();
        let id = message.id().clone();
        let overflow_key = self.pointer_key(message.body());

        let Some(handler) = poison_handler else {
            warn!(
                queue = %self.name(),
                message_id = %id,
                dequeue_count = message.dequeue_count(),
                "Poison message removed, no poison handler configured"
            );
            self.remove(lease, &id, overflow_key, router).await;
            return;
        };

        let dequeue_count = message.dequeue_count();
        let outcome = AssertUnwindSafe(handler.handle(message))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(true)) => {
                info!(
                    queue = %self.name(),
                    message_id = %id,
                    dequeue_count = dequeue_count,
                    "Poison message handled and removed"
                );
                self.remove(lease, &id, overflow_key, router).await;
            }
            Ok(Ok(false)) => {
                warn!(
                    queue = %self.name(),
                    message_id = %id,
                    dequeue_count = dequeue_count,
                    "Poison message left on the queue by poison handler"
                );
            }
            Ok(Err(e)) => router.route(Some(&id), &ProcessingError::Handler(e)),
            Err(payload) => router.route(
                Some(&id),
                &ProcessingError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                },
            ),
        }
    }

    /// Delete a leased message and then its overflow blob.
    ///
    /// Returns whether the message was deleted.
    async fn remove(
        &self,
        lease: &Lease,
        id: &MessageId,
        overflow_key: Option<String>,
        router: &ExceptionRouter,
    ) -> bool {
        if let Err(e) = lease.delete(self.inner.client.as_ref(), id).await {
            router.route(Some(id), &ProcessingError::Queue(e));
            return false;
        }

        if let Some(key) = overflow_key {
            if let Err(e) = self.inner.overflow.cleanup(&key).await {
                router.route(Some(id), &ProcessingError::Overflow(e));
            }
        }

        true
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn router(&self, base: &ProcessingOptions) -> ExceptionRouter {
        ExceptionRouter::new(
            self.name(),
            base.exception_handler().cloned(),
            self.inner.statistics.clone(),
        )
    }

    fn start_keeper(
        &self,
        lease: &Lease,
        base: &ProcessingOptions,
        schedule: RenewalSchedule,
    ) -> KeepAliveGuard {
        KeepAliveGuard::spawn(
            self.inner.client.clone(),
            self.name().to_string(),
            lease.clone(),
            base.message_lease_time(),
            schedule,
            base.cancellation_token(),
        )
    }

    /// Overflow key of a pointer body; malformed pointers have none
    fn pointer_key(&self, body: &[u8]) -> Option<String> {
        self.inner.overflow.resolve(body).ok().flatten()
    }

    /// Retrieve up to `wanted` messages, splitting the request to respect the
    /// backend's per-request maximum
    async fn retrieve(
        &self,
        wanted: u32,
        lease_time: Duration,
        router: &ExceptionRouter,
    ) -> Vec<QueueMessageWrapper> {
        let per_request = self.inner.batch_size.max_batch_size().max(1);
        let mut messages: Vec<QueueMessageWrapper> = Vec::with_capacity(wanted as usize);

        while (messages.len() as u32) < wanted {
            let count = (wanted - messages.len() as u32).min(per_request);

            match self.inner.client.get(count, lease_time).await {
                Ok(batch) => {
                    let received = batch.len() as u32;
                    messages.extend(batch.into_iter().map(QueueMessageWrapper::from_raw));
                    if received < count {
                        break;
                    }
                }
                Err(e) => {
                    router.route(None, &ProcessingError::Queue(e));
                    break;
                }
            }
        }

        debug!(
            queue = %self.name(),
            requested = wanted,
            received = messages.len(),
            "Poll completed"
        );

        messages
    }

    /// Sleep for the poll frequency; returns false if cancelled meanwhile
    async fn idle_wait(&self, base: &ProcessingOptions) -> bool {
        let cancel: &CancellationToken = base.cancellation_token();
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(base.poll_frequency()) => true,
        }
    }
}

impl std::fmt::Debug for ExtendedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedQueue")
            .field("name", &self.name())
            .field("overflow", &self.inner.overflow)
            .field("codec", &self.inner.codec)
            .finish()
    }
}

fn reap_finished(tasks: &mut JoinSet<()>, queue_name: &str) {
    while let Some(result) = tasks.try_join_next() {
        log_join_error(result, queue_name);
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>, queue_name: &str) {
    if let Err(e) = result {
        error!(queue = %queue_name, error = %e, "Message processing task failed");
    }
}

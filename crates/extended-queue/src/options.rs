//! Validated configuration of the processing strategies.
//!
//! Options are immutable once built. Out-of-range values are rejected at
//! construction time with a `ValidationError`, never later inside the
//! processing loop.

use crate::error::ValidationError;
use crate::exceptions::ExceptionHandler;
use crate::handlers::{BatchHandler, MessageHandler, PoisonHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;

/// Shortest accepted message lease
pub const MIN_MESSAGE_LEASE_TIME: Duration = Duration::from_secs(30);

/// Shortest accepted idle wait between polls
pub const MIN_POLL_FREQUENCY: Duration = Duration::from_secs(1);

/// Lowest accepted poison threshold
pub const MIN_POISON_THRESHOLD: u32 = 1;

// ============================================================================
// Base Options
// ============================================================================

/// Settings shared by every processing strategy
#[derive(Clone)]
pub struct ProcessingOptions {
    time_window: Duration,
    message_lease_time: Duration,
    poll_frequency: Duration,
    poison_threshold: u32,
    cancel: CancellationToken,
    exception_handler: Option<ExceptionHandler>,
}

impl ProcessingOptions {
    /// Create validated base options
    ///
    /// # Arguments
    ///
    /// * `time_window` - Maximum message age; older messages are discarded. Zero disables the check.
    /// * `message_lease_time` - Visibility timeout used on retrieval and renewal (at least 30s)
    /// * `poll_frequency` - Wait after an empty poll (at least 1s)
    /// * `poison_threshold` - Dequeue count above which a message is poison (at least 1)
    /// * `cancel` - Stops the processing loop when cancelled
    pub fn new(
        time_window: Duration,
        message_lease_time: Duration,
        poll_frequency: Duration,
        poison_threshold: u32,
        cancel: CancellationToken,
    ) -> Result<Self, ValidationError> {
        if message_lease_time < MIN_MESSAGE_LEASE_TIME {
            return Err(ValidationError::OutOfRange {
                field: "message_lease_time".to_string(),
                message: format!("must be at least {}s", MIN_MESSAGE_LEASE_TIME.as_secs()),
            });
        }

        if poll_frequency < MIN_POLL_FREQUENCY {
            return Err(ValidationError::OutOfRange {
                field: "poll_frequency".to_string(),
                message: format!("must be at least {}s", MIN_POLL_FREQUENCY.as_secs()),
            });
        }

        if poison_threshold < MIN_POISON_THRESHOLD {
            return Err(ValidationError::OutOfRange {
                field: "poison_threshold".to_string(),
                message: format!("must be at least {}", MIN_POISON_THRESHOLD),
            });
        }

        Ok(Self {
            time_window,
            message_lease_time,
            poll_frequency,
            poison_threshold,
            cancel,
            exception_handler: None,
        })
    }

    /// Notify `handler` of every processing failure
    pub fn with_exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    pub fn message_lease_time(&self) -> Duration {
        self.message_lease_time
    }

    pub fn poll_frequency(&self) -> Duration {
        self.poll_frequency
    }

    pub fn poison_threshold(&self) -> u32 {
        self.poison_threshold
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn exception_handler(&self) -> Option<&ExceptionHandler> {
        self.exception_handler.as_ref()
    }
}

impl std::fmt::Debug for ProcessingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingOptions")
            .field("time_window", &self.time_window)
            .field("message_lease_time", &self.message_lease_time)
            .field("poll_frequency", &self.poll_frequency)
            .field("poison_threshold", &self.poison_threshold)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

// ============================================================================
// Strategy Options
// ============================================================================

/// Options for one-at-a-time processing
pub struct SerialOptions<T> {
    base: ProcessingOptions,
    handler: Arc<dyn MessageHandler<T>>,
    poison_handler: Option<Arc<dyn PoisonHandler>>,
}

impl<T> SerialOptions<T> {
    pub fn new(base: ProcessingOptions, handler: impl MessageHandler<T> + 'static) -> Self {
        Self {
            base,
            handler: Arc::new(handler),
            poison_handler: None,
        }
    }

    /// Route poison messages to `handler` instead of removing them
    pub fn with_poison_handler(mut self, handler: impl PoisonHandler + 'static) -> Self {
        self.poison_handler = Some(Arc::new(handler));
        self
    }

    pub fn base(&self) -> &ProcessingOptions {
        &self.base
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler<T>> {
        &self.handler
    }

    pub fn poison_handler(&self) -> Option<&Arc<dyn PoisonHandler>> {
        self.poison_handler.as_ref()
    }
}

impl<T> Clone for SerialOptions<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            handler: self.handler.clone(),
            poison_handler: self.poison_handler.clone(),
        }
    }
}

/// Options for bounded-concurrency processing
pub struct ParallelOptions<T> {
    serial: SerialOptions<T>,
    max_concurrency: usize,
}

impl<T> ParallelOptions<T> {
    /// Run the handler of `serial` on up to `max_concurrency` messages at once
    pub fn new(serial: SerialOptions<T>, max_concurrency: usize) -> Result<Self, ValidationError> {
        if max_concurrency == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            serial,
            max_concurrency,
        })
    }

    pub fn base(&self) -> &ProcessingOptions {
        self.serial.base()
    }

    pub fn serial(&self) -> &SerialOptions<T> {
        &self.serial
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl<T> Clone for ParallelOptions<T> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial.clone(),
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Options for batch processing
pub struct BatchOptions<T> {
    base: ProcessingOptions,
    handler: Arc<dyn BatchHandler<T>>,
    poison_handler: Option<Arc<dyn PoisonHandler>>,
    batch_size: u32,
}

impl<T> BatchOptions<T> {
    pub fn new(
        base: ProcessingOptions,
        batch_size: u32,
        handler: impl BatchHandler<T> + 'static,
    ) -> Result<Self, ValidationError> {
        if batch_size == 0 {
            return Err(ValidationError::OutOfRange {
                field: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            base,
            handler: Arc::new(handler),
            poison_handler: None,
            batch_size,
        })
    }

    /// Route poison messages to `handler` instead of removing them
    pub fn with_poison_handler(mut self, handler: impl PoisonHandler + 'static) -> Self {
        self.poison_handler = Some(Arc::new(handler));
        self
    }

    pub fn base(&self) -> &ProcessingOptions {
        &self.base
    }

    pub fn handler(&self) -> &Arc<dyn BatchHandler<T>> {
        &self.handler
    }

    pub fn poison_handler(&self) -> Option<&Arc<dyn PoisonHandler>> {
        self.poison_handler.as_ref()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }
}

impl<T> Clone for BatchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            handler: self.handler.clone(),
            poison_handler: self.poison_handler.clone(),
            batch_size: self.batch_size,
        }
    }
}

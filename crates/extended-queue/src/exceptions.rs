//! # Exception Routing
//!
//! Every per-message failure goes through `ExceptionRouter::route`, which
//! classifies it, updates the statistics and notifies the user's exception
//! handler. Routing never fails: problems inside the user's handler are
//! logged and dropped so the processing loop keeps running.

use crate::error::ProcessingError;
use crate::message::MessageId;
use crate::statistics::QueueStatistics;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "exceptions_tests.rs"]
mod tests;

/// User callback notified of processing failures
pub type ExceptionHandler = Arc<dyn Fn(&ProcessingError) -> anyhow::Result<()> + Send + Sync>;

/// Classify, count, notify, continue
#[derive(Clone)]
pub struct ExceptionRouter {
    queue_name: String,
    handler: Option<ExceptionHandler>,
    statistics: Arc<QueueStatistics>,
}

impl ExceptionRouter {
    pub fn new(
        queue_name: impl Into<String>,
        handler: Option<ExceptionHandler>,
        statistics: Arc<QueueStatistics>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            handler,
            statistics,
        }
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Record a failed message and hand the error to the exception handler
    pub fn route(&self, message_id: Option<&MessageId>, err: &ProcessingError) {
        self.statistics.record_failure();

        let kind = if err.is_storage_error() {
            "storage"
        } else {
            "general"
        };
        let message_id = message_id.map(|id| id.as_str()).unwrap_or("-");

        let Some(handler) = &self.handler else {
            if err.is_storage_error() {
                warn!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    kind = kind,
                    error = %err,
                    "Storage error while processing message"
                );
            } else {
                error!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    kind = kind,
                    error = %err,
                    "Error while processing message"
                );
            }
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(err))) {
            Ok(Ok(())) => {
                info!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    kind = kind,
                    error = %err,
                    "Processing error handled by exception handler"
                );
            }
            Ok(Err(handler_error)) => {
                error!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    error = %err,
                    handler_error = %handler_error,
                    "Exception handler failed"
                );
            }
            Err(payload) => {
                error!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    error = %err,
                    panic = %panic_message(payload.as_ref()),
                    "Exception handler panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for ExceptionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionRouter")
            .field("queue_name", &self.queue_name)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Tests for exception routing.

use super::*;
use crate::error::{CodecError, QueueError};
use std::sync::Mutex;

fn storage_error() -> ProcessingError {
    ProcessingError::Queue(QueueError::ConnectionFailed {
        message: "reset".to_string(),
    })
}

fn general_error() -> ProcessingError {
    ProcessingError::Codec(CodecError::InvalidUtf8)
}

#[test]
fn test_route_without_handler_counts_failure() {
    let stats = Arc::new(QueueStatistics::new());
    let router = ExceptionRouter::new("orders", None, stats.clone());

    router.route(None, &storage_error());
    router.route(Some(&MessageId::new()), &general_error());

    assert!(!router.has_handler());
    assert_eq!(stats.critically_faulted(), 2);
    assert_eq!(stats.reenqueues(), 2);
}

#[test]
fn test_route_invokes_handler_with_classified_error() {
    let stats = Arc::new(QueueStatistics::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let handler: ExceptionHandler = Arc::new(move |err: &ProcessingError| -> anyhow::Result<()> {
        recorder.lock().unwrap().push(err.is_storage_error());
        Ok(())
    });
    let router = ExceptionRouter::new("orders", Some(handler), stats.clone());

    router.route(None, &storage_error());
    router.route(None, &general_error());

    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    assert_eq!(stats.critically_faulted(), 2);
}

#[test]
fn test_failing_handler_is_not_escalated() {
    let stats = Arc::new(QueueStatistics::new());
    let handler: ExceptionHandler = Arc::new(|_: &ProcessingError| -> anyhow::Result<()> {
        Err(anyhow::anyhow!("handler broke"))
    });
    let router = ExceptionRouter::new("orders", Some(handler), stats.clone());

    router.route(None, &general_error());

    assert_eq!(stats.critically_faulted(), 1);
}

#[test]
fn test_panicking_handler_is_not_escalated() {
    let stats = Arc::new(QueueStatistics::new());
    let handler: ExceptionHandler = Arc::new(|_: &ProcessingError| -> anyhow::Result<()> {
        panic!("handler exploded")
    });
    let router = ExceptionRouter::new("orders", Some(handler), stats.clone());

    router.route(None, &storage_error());
    router.route(None, &storage_error());

    assert_eq!(stats.critically_faulted(), 2);
}

#[test]
fn test_panic_message_extraction() {
    let from_str: Box<dyn Any + Send> = Box::new("static message");
    let from_string: Box<dyn Any + Send> = Box::new("owned".to_string());
    let other: Box<dyn Any + Send> = Box::new(17u8);

    assert_eq!(panic_message(from_str.as_ref()), "static message");
    assert_eq!(panic_message(from_string.as_ref()), "owned");
    assert_eq!(panic_message(other.as_ref()), "unknown panic");
}

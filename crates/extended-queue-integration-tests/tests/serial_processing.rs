//! Integration tests for serial processing
//!
//! These tests verify:
//! - Messages are handled one at a time in queue order
//! - Acknowledged messages are deleted
//! - Unacknowledged messages come back with a higher dequeue count
//! - Cancellation ends an idle loop promptly
//! - Messages older than the time window are discarded unhandled

mod common;

use bytes::Bytes;
use common::{Harness, Job, LEASE};
use extended_queue::{DecodedMessage, ProcessingError, SerialOptions, Timestamp};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_messages_are_handled_in_queue_order() {
    // Arrange
    let (harness, _blobs) = Harness::new("serial-order");
    for text in ["A", "B", "C"] {
        harness.queue.add_message_entity(&text.to_string()).await.unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let options = SerialOptions::new(
        harness.options(5),
        move |message: DecodedMessage<String>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(message.into_contents());
                anyhow::Ok(true)
            }
        },
    );

    // Act
    harness.run_serial(options, Duration::from_secs(5)).await;

    // Assert
    assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(harness.client.message_count(), 0);
    assert_eq!(harness.queue.statistics_snapshot().handled, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_message_is_redelivered() {
    // Arrange
    let (harness, _blobs) = Harness::new("serial-redelivery");
    let id = harness
        .queue
        .add_message_entity(&Job::new(1, "retry me"))
        .await
        .unwrap();

    let counts = Arc::new(Mutex::new(Vec::new()));
    let recorder = counts.clone();
    let options = SerialOptions::new(harness.options(5), move |message: DecodedMessage<Job>| {
        let recorder = recorder.clone();
        async move {
            let count = message.message().dequeue_count();
            recorder.lock().unwrap().push(count);
            // Acknowledge on the second delivery only
            anyhow::Ok(count >= 2)
        }
    });

    // Act
    harness.run_serial(options, LEASE * 2).await;

    // Assert
    assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    assert_eq!(harness.client.dequeue_count(&id), None);
    assert_eq!(harness.queue.statistics_snapshot().handled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handler_error_reaches_exception_handler() {
    // Arrange
    let (harness, _blobs) = Harness::new("serial-errors");
    harness.queue.add_message_entity(&Job::new(7, "boom")).await.unwrap();

    let routed = Arc::new(Mutex::new(Vec::new()));
    let recorder = routed.clone();
    let base = harness.options(5).with_exception_handler(Arc::new(
        move |error: &ProcessingError| -> anyhow::Result<()> {
            recorder.lock().unwrap().push(error.to_string());
            Ok(())
        },
    ));
    let options = SerialOptions::new(base, |_message: DecodedMessage<Job>| async move {
        Err::<bool, _>(anyhow::anyhow!("handler failed"))
    });

    // Act
    harness.run_serial(options, Duration::from_secs(5)).await;

    // Assert
    assert_eq!(routed.lock().unwrap().len(), 1);
    assert_eq!(harness.client.message_count(), 1);
    let statistics = harness.queue.statistics_snapshot();
    assert_eq!(statistics.critically_faulted, 1);
    assert_eq!(statistics.handled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_idle_wait_returns() {
    // Arrange
    let (harness, _blobs) = Harness::new("serial-idle");
    let base = harness.options(5);
    let options = SerialOptions::new(base, |_message: DecodedMessage<Job>| async move {
        anyhow::Ok(true)
    });

    let queue = harness.queue.clone();
    let handle = tokio::spawn(async move { queue.handle_messages(options).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Act
    harness.cancel.cancel();

    // Assert
    tokio::time::timeout(Duration::from_millis(100), handle)
        .await
        .expect("loop should stop promptly after cancellation")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_messages_are_discarded() {
    // Arrange
    let (harness, _blobs) = Harness::new("serial-stale");
    let old = Timestamp::from_datetime(Timestamp::now().as_datetime() - chrono::Duration::hours(2));
    harness
        .client
        .add_with_insertion_time(Bytes::from(r#"{"index":0,"text":"old"}"#), old)
        .unwrap();
    harness.queue.add_message_entity(&Job::new(1, "fresh")).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let options = SerialOptions::new(
        harness.options_with_window(Duration::from_secs(3600), 5),
        move |message: DecodedMessage<Job>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(message.contents().index);
                anyhow::Ok(true)
            }
        },
    );

    // Act
    harness.run_serial(options, Duration::from_secs(5)).await;

    // Assert
    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(harness.client.message_count(), 0);
    let statistics = harness.queue.statistics_snapshot();
    assert_eq!(statistics.stale, 1);
    assert_eq!(statistics.handled, 1);
}

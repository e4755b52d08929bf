//! Tests for the crate-level API surface.

use super::*;
use crate::providers::{InMemoryBlobStore, InMemoryQueue};
use std::sync::Arc;

#[test]
fn test_message_id_generation() {
    let id1 = MessageId::new();
    let id2 = MessageId::new();
    assert_ne!(id1, id2);
    assert!(!id1.as_str().is_empty());
}

#[test]
fn test_factory_reports_limits_and_codec() {
    let factory = ExtendedQueueFactory::new(
        Arc::new(InMemoryBlobStore::new()),
        ProviderType::AwsSqs.into(),
    )
    .with_codec(Codec::new().with_transform(GzipTransform::new()));

    assert_eq!(factory.codec().transform_names(), vec!["gzip"]);

    let queue = factory.create(Arc::new(InMemoryQueue::new("invoices")));
    assert_eq!(queue.name(), "invoices");
    assert_eq!(queue.codec().transform_names(), vec!["gzip"]);
}

/// Queues from one factory share the overflow store but not their counters.
#[tokio::test]
async fn test_queues_share_blob_store_but_not_statistics() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let factory = ExtendedQueueFactory::new(blobs.clone(), ProviderLimits::new(8, 32));

    let first = factory.create(Arc::new(InMemoryQueue::new("first")));
    let second = factory.create(Arc::new(InMemoryQueue::new("second")));

    first.add_message_entity(&"a long payload".to_string()).await.unwrap();
    second.add_message_entity(&"another long payload".to_string()).await.unwrap();

    let mut keys = blobs.keys();
    keys.sort();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].starts_with("first/"));
    assert!(keys[1].starts_with("second/"));

    first.statistics().record_handled();
    assert_eq!(first.statistics_snapshot().handled, 1);
    assert_eq!(second.statistics_snapshot().handled, 0);
}

#[tokio::test]
async fn test_rejected_add_cleans_up_overflow_blob() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let factory = ExtendedQueueFactory::new(blobs.clone(), ProviderLimits::new(8, 32));
    let queue = factory.create(Arc::new(InMemoryQueue::with_limits(
        "tiny",
        ProviderLimits::new(8, 32),
    )));

    let result = queue.add_message_entity(&"does not fit".to_string()).await;

    assert!(matches!(
        result,
        Err(ProcessingError::Queue(QueueError::MessageTooLarge { .. }))
    ));
    assert_eq!(blobs.blob_count(), 0);
}

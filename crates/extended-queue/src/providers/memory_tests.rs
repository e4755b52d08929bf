//! Tests for in-memory queue and blob store providers.

use super::*;

const LEASE: Duration = Duration::from_secs(30);

mod queue_operations {
    use super::*;

    /// Verify that messages are returned in insertion order.
    #[tokio::test]
    async fn test_get_returns_messages_in_fifo_order() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();
        queue.add(Bytes::from("B")).await.unwrap();
        queue.add(Bytes::from("C")).await.unwrap();

        let messages = queue.get(3, LEASE).await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.clone()).collect();

        assert_eq!(
            bodies,
            vec![Bytes::from("A"), Bytes::from("B"), Bytes::from("C")]
        );
        assert!(messages.iter().all(|m| m.dequeue_count == 1));
    }

    /// Verify that retrieved messages stay hidden until the lease expires.
    #[tokio::test(start_paused = true)]
    async fn test_retrieved_message_is_hidden_until_lease_expires() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();

        let first = queue.get(1, LEASE).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.get(1, LEASE).await.unwrap().is_empty());
        assert_eq!(queue.visible_message_count(), 0);

        tokio::time::advance(LEASE + Duration::from_millis(1)).await;

        let second = queue.get(1, LEASE).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].dequeue_count, 2);
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    /// Verify that requesting more than the per-request maximum is rejected.
    #[tokio::test]
    async fn test_get_rejects_oversized_batch() {
        let queue = InMemoryQueue::with_limits("orders", ProviderLimits::new(1024, 4));
        let result = queue.get(5, LEASE).await;
        assert!(matches!(result, Err(QueueError::BatchTooLarge { size: 5, max_size: 4 })));
    }

    /// Verify that messages above the maximum size are rejected.
    #[tokio::test]
    async fn test_add_rejects_oversized_message() {
        let queue = InMemoryQueue::with_limits("orders", ProviderLimits::new(4, 4));
        let result = queue.add(Bytes::from("too large")).await;
        assert!(matches!(result, Err(QueueError::MessageTooLarge { .. })));
    }

    /// Verify that delete removes the message when the receipt is current.
    #[tokio::test]
    async fn test_delete_with_current_receipt() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();

        let message = queue.get(1, LEASE).await.unwrap().remove(0);
        queue.delete(&message.id, &message.receipt).await.unwrap();

        assert_eq!(queue.message_count(), 0);
    }

    /// Verify that deleting twice reports the message as not found.
    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();

        let message = queue.get(1, LEASE).await.unwrap().remove(0);
        queue.delete(&message.id, &message.receipt).await.unwrap();

        let result = queue.delete(&message.id, &message.receipt).await;
        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));
    }

    /// Verify that visibility updates rotate the receipt and invalidate the old one.
    #[tokio::test]
    async fn test_update_visibility_rotates_receipt() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();

        let message = queue.get(1, LEASE).await.unwrap().remove(0);
        let update = queue
            .update_visibility(&message.id, &message.receipt, LEASE)
            .await
            .unwrap();

        assert_ne!(update.receipt, message.receipt);

        let stale = queue.delete(&message.id, &message.receipt).await;
        assert!(stale.unwrap_err().is_message_not_found());

        queue.delete(&message.id, &update.receipt).await.unwrap();
        assert_eq!(queue.message_count(), 0);
    }

    /// Verify that renewing keeps a message hidden past its original lease.
    #[tokio::test(start_paused = true)]
    async fn test_update_visibility_extends_lease() {
        let queue = InMemoryQueue::new("orders");
        queue.add(Bytes::from("A")).await.unwrap();

        let message = queue.get(1, LEASE).await.unwrap().remove(0);
        tokio::time::advance(Duration::from_secs(20)).await;
        queue
            .update_visibility(&message.id, &message.receipt, LEASE)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert!(queue.get(1, LEASE).await.unwrap().is_empty());
    }

    /// Verify dequeue counts can be inspected for stored messages.
    #[tokio::test]
    async fn test_dequeue_count_inspection() {
        let queue = InMemoryQueue::new("orders");
        let id = queue.add(Bytes::from("A")).await.unwrap();

        assert_eq!(queue.dequeue_count(&id), Some(0));
        queue.get(1, LEASE).await.unwrap();
        assert_eq!(queue.dequeue_count(&id), Some(1));
        assert_eq!(queue.dequeue_count(&MessageId::new()), None);
    }
}

mod blob_store_operations {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryBlobStore::new();
        store.put("orders/1", Bytes::from("payload")).await.unwrap();

        assert_eq!(store.blob_count(), 1);
        assert_eq!(store.blob_size("orders/1"), Some(7));
        assert_eq!(store.get("orders/1").await.unwrap(), Bytes::from("payload"));

        store.delete("orders/1").await.unwrap();
        assert_eq!(store.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_get_missing_blob() {
        let store = InMemoryBlobStore::new();
        let result = store.get("orders/missing").await;
        assert!(matches!(result, Err(StorageError::BlobNotFound { .. })));
    }

    #[tokio::test]
    async fn test_put_rejects_empty_key() {
        let store = InMemoryBlobStore::new();
        let result = store.put("", Bytes::from("x")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }
}

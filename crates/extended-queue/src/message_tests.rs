//! Tests for message types.

use super::*;

fn raw_message(dequeue_count: u32, inserted_ago: Duration) -> RawMessage {
    RawMessage {
        id: MessageId::new(),
        receipt: ReceiptHandle::new("receipt-1".to_string()),
        body: Bytes::from("payload"),
        dequeue_count,
        insertion_time: Timestamp::from_datetime(Utc::now() - inserted_ago),
        next_visible_time: Timestamp::from_datetime(Utc::now() + Duration::seconds(30)),
    }
}

mod identifiers {
    use super::*;

    #[test]
    fn test_message_id_generation_is_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_id_from_str_rejects_empty() {
        assert!("".parse::<MessageId>().is_err());

        let id: MessageId = "abc".parse().unwrap();
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_receipt_handle_exposes_handle() {
        let receipt = ReceiptHandle::new("pop-1".to_string());
        assert_eq!(receipt.handle(), "pop-1");
    }
}

mod timestamps {
    use super::*;

    #[test]
    fn test_elapsed_and_remaining_never_negative() {
        let past = Timestamp::from_datetime(Utc::now() - Duration::seconds(10));
        let future = Timestamp::from_datetime(Utc::now() + Duration::seconds(10));

        assert!(past.elapsed() >= Duration::seconds(9));
        assert_eq!(past.remaining(), Duration::zero());
        assert_eq!(future.elapsed(), Duration::zero());
        assert!(future.remaining() > Duration::seconds(8));
    }

    #[test]
    fn test_timestamp_round_trips_through_rfc3339() {
        let ts: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        assert_eq!(ts.to_string(), "2024-01-02 03:04:05 UTC");
    }
}

mod wrapper {
    use super::*;

    #[test]
    fn test_wrapper_copies_raw_fields() {
        let raw = raw_message(3, Duration::seconds(1));
        let id = raw.id.clone();
        let wrapper = QueueMessageWrapper::from_raw(raw);

        assert_eq!(wrapper.id(), &id);
        assert_eq!(wrapper.receipt().handle(), "receipt-1");
        assert_eq!(wrapper.body(), &Bytes::from("payload"));
        assert_eq!(wrapper.dequeue_count(), 3);
        assert!(!wrapper.was_overflown());
        assert!(wrapper.overflow_key().is_none());
    }

    #[test]
    fn test_zero_time_window_disables_staleness() {
        let wrapper = QueueMessageWrapper::from_raw(raw_message(1, Duration::days(30)));
        assert!(!wrapper.is_older_than(std::time::Duration::ZERO));
    }

    #[test]
    fn test_staleness_against_time_window() {
        let old = QueueMessageWrapper::from_raw(raw_message(1, Duration::minutes(10)));
        let fresh = QueueMessageWrapper::from_raw(raw_message(1, Duration::seconds(1)));
        let window = std::time::Duration::from_secs(60);

        assert!(old.is_older_than(window));
        assert!(!fresh.is_older_than(window));
    }

    #[test]
    fn test_dequeue_threshold_is_exclusive() {
        let first = QueueMessageWrapper::from_raw(raw_message(1, Duration::zero()));
        let second = QueueMessageWrapper::from_raw(raw_message(2, Duration::zero()));

        assert!(!first.exceeds_dequeue_threshold(1));
        assert!(second.exceeds_dequeue_threshold(1));
    }

    #[test]
    fn test_set_overflow_updates_flag() {
        let mut wrapper = QueueMessageWrapper::from_raw(raw_message(1, Duration::zero()));
        wrapper.set_overflow(Some("orders/key".to_string()));
        assert!(wrapper.was_overflown());
        assert_eq!(wrapper.overflow_key(), Some("orders/key"));

        wrapper.set_overflow(None);
        assert!(!wrapper.was_overflown());
    }

    #[test]
    fn test_decoded_message_parts() {
        let wrapper = QueueMessageWrapper::from_raw(raw_message(1, Duration::zero()));
        let id = wrapper.id().clone();
        let decoded = DecodedMessage::new(wrapper, "hello".to_string());

        assert_eq!(decoded.id(), &id);
        assert_eq!(decoded.contents(), "hello");
        let (message, contents) = decoded.into_parts();
        assert_eq!(message.id(), &id);
        assert_eq!(contents, "hello");
    }
}

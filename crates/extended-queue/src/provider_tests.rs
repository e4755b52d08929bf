//! Tests for provider types and limits.

use super::*;

#[test]
fn test_provider_message_sizes() {
    assert_eq!(ProviderType::AzureStorageQueue.max_message_size(), 48 * 1024);
    assert_eq!(ProviderType::AwsSqs.max_message_size(), 256 * 1024);
    assert_eq!(ProviderType::InMemory.max_message_size(), 64 * 1024);
}

#[test]
fn test_provider_batch_sizes() {
    assert_eq!(ProviderType::AzureStorageQueue.max_batch_size(), 32);
    assert_eq!(ProviderType::AwsSqs.max_batch_size(), 10);
}

#[test]
fn test_provider_type_as_size_providers() {
    let size: &dyn MaxMessageSizeProvider = &ProviderType::AwsSqs;
    let batch: &dyn MaxBatchSizeProvider = &ProviderType::AwsSqs;
    assert_eq!(size.max_message_size(), 256 * 1024);
    assert_eq!(batch.max_batch_size(), 10);
}

#[test]
fn test_limits_from_provider() {
    let limits: ProviderLimits = ProviderType::AzureStorageQueue.into();
    assert_eq!(limits.max_message_size, 48 * 1024);
    assert_eq!(limits.max_batch_size, 32);

    assert_eq!(ProviderLimits::default(), ProviderType::InMemory.into());
}

#[test]
fn test_custom_limits() {
    let limits = ProviderLimits::new(1024, 5);
    assert_eq!(MaxMessageSizeProvider::max_message_size(&limits), 1024);
    assert_eq!(MaxBatchSizeProvider::max_batch_size(&limits), 5);
}

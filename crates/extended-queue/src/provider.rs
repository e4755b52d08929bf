//! Provider types and their message limits.

use crate::client::{MaxBatchSizeProvider, MaxMessageSizeProvider};
use serde::{Deserialize, Serialize};

/// Enumeration of known queue backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureStorageQueue,
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Get usable message body size for provider.
    ///
    /// Azure storage queues cap messages at 64KB after base64 encoding of the
    /// body, which leaves 48KB for the payload itself.
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureStorageQueue => 48 * 1024,
            Self::AwsSqs => 256 * 1024,
            Self::InMemory => 64 * 1024,
        }
    }

    /// Get maximum number of messages returned by one retrieval request
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::AzureStorageQueue => 32,
            Self::AwsSqs => 10,
            Self::InMemory => 32,
        }
    }
}

impl MaxMessageSizeProvider for ProviderType {
    fn max_message_size(&self) -> usize {
        ProviderType::max_message_size(self)
    }
}

impl MaxBatchSizeProvider for ProviderType {
    fn max_batch_size(&self) -> u32 {
        ProviderType::max_batch_size(self)
    }
}

/// Explicit message limits, for backends without a `ProviderType` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLimits {
    pub max_message_size: usize,
    pub max_batch_size: u32,
}

impl ProviderLimits {
    pub fn new(max_message_size: usize, max_batch_size: u32) -> Self {
        Self {
            max_message_size,
            max_batch_size,
        }
    }
}

impl From<ProviderType> for ProviderLimits {
    fn from(provider: ProviderType) -> Self {
        Self::new(provider.max_message_size(), provider.max_batch_size())
    }
}

impl Default for ProviderLimits {
    fn default() -> Self {
        ProviderType::InMemory.into()
    }
}

impl MaxMessageSizeProvider for ProviderLimits {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl MaxBatchSizeProvider for ProviderLimits {
    fn max_batch_size(&self) -> u32 {
        self.max_batch_size
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

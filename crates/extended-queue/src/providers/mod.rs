//! Reference backend implementations.
//!
//! This module contains in-memory implementations of `QueueClient` and
//! `BlobStore` plus a filesystem-backed `BlobStore`.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemBlobStore;
pub use memory::{InMemoryBlobStore, InMemoryQueue};

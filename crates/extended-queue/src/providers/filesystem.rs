//! # Filesystem Blob Store
//!
//! Local filesystem implementation of `BlobStore` for development and
//! single-host deployments.

use crate::client::BlobStore;
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;

/// Filesystem-based blob store
///
/// Each blob is one file below the base directory. Keys may contain `/`
/// separators, which map to subdirectories.
///
/// # Examples
///
/// ```no_run
/// use extended_queue::providers::FilesystemBlobStore;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FilesystemBlobStore::new(PathBuf::from("./data/overflow")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Create new filesystem blob store
    ///
    /// # Errors
    ///
    /// Returns error if base path cannot be created or accessed.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to create base directory: {}", e),
            })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a key to a path below the base directory.
    ///
    /// Only plain path segments are accepted so a key can never escape the
    /// base directory.
    fn blob_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }

        Ok(append_suffix(&self.base_path.join(relative), ".blob"))
    }
}

/// Append to the final path segment, keeping any extension the key carries
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &str, contents: Bytes) -> Result<(), StorageError> {
        let blob_path = self.blob_path(key)?;

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::InternalError {
                    message: format!("Failed to create directory structure: {}", e),
                })?;
        }

        // Write to temporary file first (atomic write pattern)
        let temp_path = append_suffix(&blob_path, ".tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to create temp file: {}", e),
            })?;

        file.write_all(&contents)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to write blob: {}", e),
            })?;

        file.flush()
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to flush file: {}", e),
            })?;

        fs::rename(&temp_path, &blob_path)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to rename temp file: {}", e),
            })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let blob_path = self.blob_path(key)?;

        match fs::read(&blob_path).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::BlobNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::InternalError {
                message: format!("Failed to read blob: {}", e),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let blob_path = self.blob_path(key)?;

        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::BlobNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::InternalError {
                message: format!("Failed to delete blob: {}", e),
            }),
        }
    }
}

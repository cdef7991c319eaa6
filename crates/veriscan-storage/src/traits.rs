//! Storage abstraction trait
//!
//! This module defines the ObjectStore trait that all storage backends must
//! implement.

use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object store abstraction
///
/// Backends (local filesystem, in-memory) must implement this trait. The
/// intake gateway, scan worker, and replication layer only speak through it,
/// so a remote backend slots in without touching the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Store `data` under `key` only if no object exists there.
    ///
    /// Returns `true` if this call wrote the object, `false` if it already
    /// existed. This is the write-once primitive the clean store relies on:
    /// duplicate promotions of the same checksum collapse into one object.
    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> StorageResult<bool>;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove the object under `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Copy an object from one key to another within this store.
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()>;

    /// List all keys starting with `prefix`, in unspecified order.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

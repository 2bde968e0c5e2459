//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::Bytes;
use dropkit_core::StorageBackend;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
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

    #[error("File not found: {0}")]
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

/// Chunked byte stream returned by [`Storage::read`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// All storage backends (S3-compatible object stores, local filesystem) must
/// implement this trait. The upload lifecycle handlers and the resumable
/// protocol adapter work against it without coupling to a specific backend;
/// the only place the backend identity matters is the factory switch and the
/// direct-vs-presigned transfer mode decision.
///
/// **Key format:** `{user_id}/{yyyy}/{mm}/{dd}/{upload_id}.{extension}`, see
/// the crate root documentation. Keys are caller-supplied; derivation lives in
/// the `keys` module.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object at `key`, replacing any existing object.
    ///
    /// Returns the backend location descriptor (a public or backend-internal
    /// URL for the object).
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<String>;

    /// Read an entire object into memory.
    async fn read_all(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Read an object as a stream of chunks (for large files).
    async fn read(&self, key: &str) -> StorageResult<ByteStream>;

    /// Delete the object at `key`.
    ///
    /// Idempotent: deleting a key that does not exist is a success, so
    /// deletion is always safe to retry.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of the object at `key`.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Generate a presigned/temporary GET URL for direct read access.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Generate a presigned PUT URL for a direct client upload.
    ///
    /// Only supported by object-store backends; the local backend returns a
    /// `ConfigError` (local uploads go through the resumable protocol).
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

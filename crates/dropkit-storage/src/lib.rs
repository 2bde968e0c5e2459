//! Dropkit Storage Library
//!
//! This crate provides the storage abstraction and its backends. It includes
//! the Storage trait and implementations for S3-compatible object stores and
//! the local filesystem.
//!
//! # Storage key format
//!
//! Keys are derived once at upload creation and never reassigned:
//!
//! - `{user_id}/{yyyy}/{mm}/{dd}/{upload_id}.{extension}`
//!
//! Keys must not contain `..` or a leading `/`. Key derivation is centralized
//! in the `keys` module so records and backends stay consistent.

pub mod factory;
pub mod keys;
pub mod local;
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use dropkit_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{derive_file_key, part_key};
pub use local::LocalStorage;
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};

//! Dropkit Database Library
//!
//! Repositories for upload metadata and the deletion outbox, plus the shared
//! transaction helper. All mutating repository operations come in pool and
//! `_tx` variants so callers can compose multi-step writes atomically.

pub mod outbox;
pub mod transaction;
pub mod uploads;

// Re-export commonly used types
pub use outbox::{DeletionJob, DeletionOutboxRepository, DELETION_NOTIFY_CHANNEL};
pub use transaction::with_transaction;
pub use uploads::{UploadPart, UploadRepository};

//! Dropkit Worker Library
//!
//! The deletion worker: drains the durable deletion outbox, removes backing
//! bytes from storage, and hard-deletes upload metadata once removal is
//! confirmed. Also sweeps long-expired uploads into the outbox.

pub mod deleter;

pub use deleter::{DeletionWorker, DeletionWorkerConfig};

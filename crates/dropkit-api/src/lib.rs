//! Dropkit API
//!
//! Axum HTTP surface for the upload lifecycle: creation, presigned and
//! resumable transfer, listing, content access, and two-phase deletion.
//! Exposed as a library so integration tests can build the router.

pub mod api_doc;
pub mod auth;
pub mod error;
pub mod events;
pub mod handlers;
pub mod setup;
pub mod state;

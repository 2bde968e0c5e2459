//! Data models for the upload lifecycle.

pub mod upload;

pub use upload::*;

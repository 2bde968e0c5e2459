pub mod content;
pub mod resumable;
pub mod uploads;

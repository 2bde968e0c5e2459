//! Upload lifecycle events.
//!
//! Handlers push events into a request-scoped [`EventCollector`] while they
//! work; the collector is flushed as a single ordered batch strictly after the
//! surrounding transaction commits. A rolled-back request drops its collector
//! unflushed, so no downstream listener ever observes a write that did not
//! happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UploadType;

/// Events emitted by the upload lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    Created {
        upload_id: Uuid,
        user_id: Uuid,
        upload_type: UploadType,
    },
    TransferStarted {
        upload_id: Uuid,
    },
    Completed {
        upload_id: Uuid,
    },
    Cancelled {
        upload_id: Uuid,
    },
    /// Soft-delete committed; byte removal and hard delete are owned by the
    /// deletion worker via the durable outbox.
    DeletionRequested {
        upload_id: Uuid,
        file_key: String,
        requested_at: DateTime<Utc>,
    },
}

/// Request-scoped event collector.
///
/// Owned by a single request; events accumulate in order and are handed back
/// by [`EventCollector::flush`] once the transaction has committed.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<UploadEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: UploadEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the collector, returning events in recording order.
    pub fn flush(self) -> Vec<UploadEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_preserves_recording_order() {
        let upload_id = Uuid::new_v4();
        let mut collector = EventCollector::new();
        collector.record(UploadEvent::TransferStarted { upload_id });
        collector.record(UploadEvent::Completed { upload_id });

        let events = collector.flush();
        assert_eq!(
            events,
            vec![
                UploadEvent::TransferStarted { upload_id },
                UploadEvent::Completed { upload_id },
            ]
        );
    }

    #[test]
    fn new_collector_is_empty() {
        assert!(EventCollector::new().is_empty());
    }
}

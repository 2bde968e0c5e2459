//! Post-commit event dispatch.
//!
//! Handlers accumulate [`UploadEvent`]s in a request-scoped collector while
//! their transaction is open and call [`dispatch`] only after the commit
//! succeeded. Dispatch is best-effort: failures are logged and never fail the
//! triggering request. Deletion itself does not depend on the notification —
//! the durable outbox row committed with the transaction, the NOTIFY merely
//! wakes the worker early.

use dropkit_core::{EventCollector, UploadEvent};
use dropkit_db::DeletionOutboxRepository;
use sqlx::PgPool;

/// Flush a collector after commit, in recording order.
pub async fn dispatch(pool: &PgPool, collector: EventCollector) {
    if collector.is_empty() {
        return;
    }

    for event in collector.flush() {
        match &event {
            UploadEvent::Created {
                upload_id,
                user_id,
                upload_type,
            } => {
                tracing::info!(
                    upload_id = %upload_id,
                    user_id = %user_id,
                    upload_type = ?upload_type,
                    "Upload created"
                );
            }
            UploadEvent::TransferStarted { upload_id } => {
                tracing::info!(upload_id = %upload_id, "Upload transfer started");
            }
            UploadEvent::Completed { upload_id } => {
                tracing::info!(upload_id = %upload_id, "Upload completed");
            }
            UploadEvent::Cancelled { upload_id } => {
                tracing::info!(upload_id = %upload_id, "Upload cancelled");
            }
            UploadEvent::DeletionRequested {
                upload_id,
                file_key,
                requested_at,
            } => {
                tracing::info!(
                    upload_id = %upload_id,
                    file_key = %file_key,
                    requested_at = %requested_at,
                    "Upload deletion requested"
                );
                if let Err(e) = DeletionOutboxRepository::notify(pool).await {
                    tracing::warn!(
                        error = %e,
                        upload_id = %upload_id,
                        "Failed to notify deletion worker, poll loop will pick it up"
                    );
                }
            }
        }
    }
}

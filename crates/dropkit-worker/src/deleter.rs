//! Deletion worker: outbox claim loop, LISTEN/NOTIFY or polling, retry, and
//! the expired-upload sweep.
//!
//! Shutdown: [`DeletionWorker::shutdown`] signals the loop to stop; it does
//! not wait for an in-flight batch. For graceful shutdown, coordinate with
//! your runtime and allow time for the running batch to finish before
//! process exit.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use dropkit_db::{
    with_transaction, DeletionJob, DeletionOutboxRepository, UploadRepository,
    DELETION_NOTIFY_CHANNEL,
};
use dropkit_storage::Storage;

/// Maximum delay in seconds before retrying a failed deletion. Caps
/// exponential backoff so that high attempt counts do not produce excessively
/// long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 900;

/// How many due jobs are claimed per cycle.
const CLAIM_BATCH_SIZE: i64 = 16;

/// Seconds a claimed job is leased to this worker before another may retry it.
const CLAIM_LEASE_SECS: i64 = 120;

/// Seconds between runs of the expired-upload sweep.
const EXPIRED_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Rows swept per expired-sweep run.
const EXPIRED_SWEEP_BATCH: i64 = 100;

/// Computes backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> u64 {
    (2_u64.saturating_pow(attempts.max(0) as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct DeletionWorkerConfig {
    pub poll_interval_ms: u64,
    /// Attempt count past which failures are escalated to error logs. The job
    /// keeps being retried at the backoff cap; the metadata row is never
    /// silently dropped while its bytes may still exist.
    pub max_delete_attempts: i32,
    /// Hours past `expiration` before an expired upload is swept into the
    /// outbox. 0 disables the sweep.
    pub expired_retention_hours: i64,
}

impl Default for DeletionWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_delete_attempts: 8,
            expired_retention_hours: 24,
        }
    }
}

pub struct DeletionWorker {
    shutdown_tx: mpsc::Sender<()>,
}

impl DeletionWorker {
    /// Spawn the worker loop.
    ///
    /// The worker wakes on PostgreSQL NOTIFY (sent by the API after a delete
    /// commits) and additionally polls at `poll_interval_ms`, so enqueued
    /// deletions survive a missed notification or an API crash.
    pub fn spawn(
        pool: sqlx::PgPool,
        uploads: UploadRepository,
        outbox: DeletionOutboxRepository,
        storage: Arc<dyn Storage>,
        config: DeletionWorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::run(pool, uploads, outbox, storage, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn run(
        pool: sqlx::PgPool,
        uploads: UploadRepository,
        outbox: DeletionOutboxRepository,
        storage: Arc<dyn Storage>,
        config: DeletionWorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            poll_interval_ms = config.poll_interval_ms,
            max_delete_attempts = config.max_delete_attempts,
            expired_retention_hours = config.expired_retention_hours,
            "Deletion worker started"
        );

        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        {
            let pool = pool.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(DELETION_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = notify_tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        let mut sweep_interval =
            tokio::time::interval(Duration::from_secs(EXPIRED_SWEEP_INTERVAL_SECS));
        sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Deletion worker shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::process_due(&pool, &uploads, &outbox, &storage, &config).await;
                }
                _ = sleep(poll_interval) => {
                    Self::process_due(&pool, &uploads, &outbox, &storage, &config).await;
                }
                _ = sweep_interval.tick() => {
                    if config.expired_retention_hours > 0 {
                        Self::sweep_expired(&pool, &uploads, &outbox, &config).await;
                    }
                }
            }
        }

        tracing::info!("Deletion worker stopped");
    }

    async fn process_due(
        pool: &sqlx::PgPool,
        uploads: &UploadRepository,
        outbox: &DeletionOutboxRepository,
        storage: &Arc<dyn Storage>,
        config: &DeletionWorkerConfig,
    ) {
        let jobs = match outbox.claim_due(CLAIM_BATCH_SIZE, CLAIM_LEASE_SECS).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim deletion jobs");
                return;
            }
        };

        for job in jobs {
            if let Err(e) = Self::process_job(pool, uploads, outbox, storage, &job).await {
                let backoff = compute_retry_backoff_seconds(job.attempts);
                let next_attempt_at = Utc::now() + ChronoDuration::seconds(backoff as i64);

                if job.attempts >= config.max_delete_attempts {
                    tracing::error!(
                        error = %e,
                        upload_id = %job.upload_id,
                        file_key = %job.file_key,
                        attempts = job.attempts,
                        "Deletion still failing past max attempts, retrying at backoff cap"
                    );
                } else {
                    tracing::warn!(
                        error = %e,
                        upload_id = %job.upload_id,
                        file_key = %job.file_key,
                        attempts = job.attempts,
                        backoff_seconds = backoff,
                        "Deletion failed, rescheduling"
                    );
                }

                if let Err(e) = outbox
                    .reschedule(job.id, next_attempt_at, &e.to_string())
                    .await
                {
                    tracing::error!(error = %e, job_id = %job.id, "Failed to reschedule deletion job");
                }
            }
        }
    }

    /// Remove the backing bytes, then hard-delete the metadata row.
    ///
    /// Storage deletes are idempotent, so a job that crashed between storage
    /// removal and the hard delete simply re-runs in full. The metadata row is
    /// only removed after every storage delete succeeded.
    async fn process_job(
        pool: &sqlx::PgPool,
        uploads: &UploadRepository,
        outbox: &DeletionOutboxRepository,
        storage: &Arc<dyn Storage>,
        job: &DeletionJob,
    ) -> Result<(), anyhow::Error> {
        storage.delete(&job.file_key).await?;

        // Part objects left behind by an interrupted resumable upload.
        let parts = uploads.get_parts(job.upload_id).await?;
        for part in &parts {
            storage.delete(&part.part_key).await?;
        }

        let uploads = uploads.clone();
        let outbox_repo = outbox.clone();
        let upload_id = job.upload_id;
        let job_id = job.id;
        with_transaction(pool, move |tx| {
            Box::pin(async move {
                uploads.delete_parts_tx(tx, upload_id).await?;
                uploads.hard_delete_tx(tx, upload_id).await?;
                outbox_repo.delete_tx(tx, job_id).await?;
                Ok(())
            })
        })
        .await?;

        tracing::info!(
            upload_id = %job.upload_id,
            file_key = %job.file_key,
            parts = parts.len(),
            "Upload bytes removed and metadata hard-deleted"
        );

        Ok(())
    }

    /// Soft-delete long-expired uploads and enqueue their byte removal.
    async fn sweep_expired(
        pool: &sqlx::PgPool,
        uploads: &UploadRepository,
        outbox: &DeletionOutboxRepository,
        config: &DeletionWorkerConfig,
    ) {
        let cutoff = Utc::now() - ChronoDuration::hours(config.expired_retention_hours);
        let expired = match uploads.find_expired(cutoff, EXPIRED_SWEEP_BATCH).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Expired sweep query failed");
                return;
            }
        };

        let mut swept = 0usize;
        for record in expired {
            let uploads = uploads.clone();
            let outbox_repo = outbox.clone();
            let id = record.id;
            let file_key = record.file_key.clone();
            let result = with_transaction(pool, move |tx| {
                Box::pin(async move {
                    uploads.soft_delete_tx(tx, id, None).await?;
                    outbox_repo.enqueue_tx(tx, id, &file_key, None).await?;
                    Ok(())
                })
            })
            .await;

            match result {
                Ok(()) => swept += 1,
                Err(e) => {
                    tracing::warn!(error = %e, upload_id = %id, "Failed to sweep expired upload")
                }
            }
        }

        if swept > 0 {
            tracing::info!(swept, "Expired uploads swept into deletion outbox");
        }
    }

    /// Signals the worker loop to stop claiming new jobs and exit.
    ///
    /// Returns immediately after sending the signal; it does **not** wait for
    /// the in-flight batch to complete.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating deletion worker shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(9), 512);
        assert_eq!(compute_retry_backoff_seconds(10), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(30), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn negative_attempts_do_not_panic() {
        assert_eq!(compute_retry_backoff_seconds(-1), 1);
    }
}

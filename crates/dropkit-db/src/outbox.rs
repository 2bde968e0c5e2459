//! Deletion outbox repository.
//!
//! The two-phase delete is driven by durable rows here rather than
//! fire-and-forget events: the request transaction enqueues a row together
//! with the soft delete, and the deletion worker claims due rows, removes the
//! backing bytes, and hard-deletes the upload. A crashed worker resumes by
//! re-claiming whatever is still in the table.

use chrono::{DateTime, Utc};
use dropkit_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a deletion is enqueued.
pub const DELETION_NOTIFY_CHANNEL: &str = "dropkit_deletion";

/// One pending deletion.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeletionJob {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub file_key: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the deletion outbox
#[derive(Clone)]
pub struct DeletionOutboxRepository {
    pool: PgPool,
}

impl DeletionOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a deletion inside the caller's transaction, so the outbox row
    /// commits atomically with the soft delete that requested it.
    #[tracing::instrument(
        skip(self, tx),
        fields(db.table = "deletion_outbox", db.operation = "insert", upload_id = %upload_id)
    )]
    pub async fn enqueue_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        upload_id: Uuid,
        file_key: &str,
        requested_by: Option<Uuid>,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO deletion_outbox (id, upload_id, file_key, requested_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(upload_id)
        .bind(file_key)
        .bind(requested_by)
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }

    /// Claim up to `limit` due jobs.
    ///
    /// Claiming pushes `next_attempt_at` forward by `lease_seconds` under
    /// `FOR UPDATE SKIP LOCKED`, so concurrent workers never process the same
    /// job and a worker that dies mid-job loses its claim after the lease.
    #[tracing::instrument(skip(self), fields(db.table = "deletion_outbox", db.operation = "claim"))]
    pub async fn claim_due(
        &self,
        limit: i64,
        lease_seconds: i64,
    ) -> Result<Vec<DeletionJob>, AppError> {
        let jobs = sqlx::query_as::<Postgres, DeletionJob>(
            r#"
            UPDATE deletion_outbox
            SET next_attempt_at = NOW() + make_interval(secs => $2)
            WHERE id IN (
                SELECT id FROM deletion_outbox
                WHERE next_attempt_at <= NOW()
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(lease_seconds as f64)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Push a failed job back with an incremented attempt counter.
    #[tracing::instrument(
        skip(self, last_error),
        fields(db.table = "deletion_outbox", db.operation = "update", db.record_id = %id)
    )]
    pub async fn reschedule(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE deletion_outbox
            SET attempts = attempts + 1, next_attempt_at = $2, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a completed job inside the caller's transaction (committed
    /// together with the hard delete of the upload row).
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM deletion_outbox WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Wake any listening deletion worker. Best-effort: callers treat a
    /// failure as log-only, the poll loop picks the job up regardless.
    pub async fn notify(pool: &PgPool) -> Result<(), AppError> {
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(DELETION_NOTIFY_CHANNEL)
            .execute(pool)
            .await?;

        Ok(())
    }
}

//! Upload record repository.
//!
//! CRUD and transactional access to the `uploads` table plus the
//! `upload_parts` bookkeeping used by the resumable protocol adapter. Status
//! updates carry a state-machine guard in the WHERE clause so concurrent
//! writers cannot race a record out of the allowed transition DAG.

use chrono::{DateTime, Utc};
use dropkit_core::models::{UploadRecord, UploadStatus};
use dropkit_core::AppError;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// One accepted part of a resumable upload.
#[derive(Debug, sqlx::FromRow)]
pub struct UploadPart {
    pub upload_id: Uuid,
    pub byte_offset: i64,
    pub part_key: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// Repository for upload records
#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new upload record inside the caller's transaction.
    ///
    /// A unique violation on `file_key` surfaces as [`AppError::Conflict`] so
    /// callers can retry key derivation instead of the whole operation.
    #[tracing::instrument(
        skip(self, tx, record),
        fields(db.table = "uploads", db.operation = "insert", db.record_id = %record.id)
    )]
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &UploadRecord,
    ) -> Result<(), AppError> {
        // Dynamic SQLx queries to avoid requiring DATABASE_URL/sqlx prepare
        let result = sqlx::query(
            r#"
            INSERT INTO uploads (
                id, file_key, status, file_name, content_type, extension,
                size, upload_offset, tags, expiration, secret_hash,
                is_deleted, user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.file_key)
        .bind(record.status)
        .bind(&record.file_name)
        .bind(&record.content_type)
        .bind(&record.extension)
        .bind(record.size)
        .bind(record.upload_offset)
        .bind(serde_json::to_value(&record.tags)?)
        .bind(record.expiration)
        .bind(&record.secret_hash)
        .bind(record.user_id)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict("Duplicate storage key for upload".to_string()),
            ),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Fetch a live (non-deleted) record by id.
    #[tracing::instrument(
        skip(self),
        fields(db.table = "uploads", db.operation = "select", db.record_id = %id)
    )]
    pub async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, UploadRecord>(
            "SELECT * FROM uploads WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Fetch a live record by its storage key (completion callbacks resolve
    /// uploads by key, not by the externally visible id).
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub async fn get_by_file_key(&self, file_key: &str) -> Result<Option<UploadRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, UploadRecord>(
            "SELECT * FROM uploads WHERE file_key = $1 AND is_deleted = FALSE",
        )
        .bind(file_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Owner-scoped page ordered by creation time, descending, with the total
    /// count piggybacked on the page rows via a window function.
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub async fn list(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> Result<(Vec<UploadRecord>, i64), AppError> {
        let rows = sqlx::query(
            r#"
            SELECT *, COUNT(*) OVER() AS total_count
            FROM uploads
            WHERE user_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(take)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            // The window is past the end; fall back to a bare count so the
            // caller still learns the total.
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM uploads WHERE user_id = $1 AND is_deleted = FALSE",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            return Ok((Vec::new(), total));
        }

        let total: i64 = rows[0].try_get("total_count")?;
        let records = rows
            .iter()
            .map(UploadRecord::from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok((records, total))
    }

    /// Compare-and-set status transition, guarded by the transition DAG.
    ///
    /// Fails with [`AppError::Conflict`] when the record is no longer in
    /// `from` (e.g. a concurrent writer advanced it) and with
    /// [`AppError::Validation`] when `from -> to` is not a legal transition.
    pub async fn update_status(
        &self,
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.update_status_tx(&mut tx, id, from, to).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, tx),
        fields(db.table = "uploads", db.operation = "update", db.record_id = %id, %from, %to)
    )]
    pub async fn update_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
    ) -> Result<(), AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::Validation(format!(
                "Illegal upload status transition {} -> {}",
                from, to
            )));
        }

        let result = sqlx::query(
            "UPDATE uploads SET status = $3 WHERE id = $1 AND status = $2 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Upload is no longer in status {}",
                from
            )));
        }

        Ok(())
    }

    /// Advance the resumable-protocol offset, compare-and-set on the expected
    /// current offset so interleaved PATCHes serialize.
    #[tracing::instrument(
        skip(self, tx),
        fields(db.table = "uploads", db.operation = "update", db.record_id = %id)
    )]
    pub async fn update_offset_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        expected_offset: i64,
        new_offset: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE uploads SET upload_offset = $3
            WHERE id = $1 AND upload_offset = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(expected_offset)
        .bind(new_offset)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Upload offset advanced concurrently".to_string(),
            ));
        }

        Ok(())
    }

    /// Record one accepted part. Retransmissions of the same offset replace
    /// the earlier row.
    pub async fn record_part_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        upload_id: Uuid,
        byte_offset: i64,
        part_key: &str,
        size: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_parts (upload_id, byte_offset, part_key, size)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (upload_id, byte_offset)
            DO UPDATE SET part_key = EXCLUDED.part_key, size = EXCLUDED.size
            "#,
        )
        .bind(upload_id)
        .bind(byte_offset)
        .bind(part_key)
        .bind(size)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// All parts of an upload, in assembly order.
    pub async fn get_parts(&self, upload_id: Uuid) -> Result<Vec<UploadPart>, AppError> {
        let parts = sqlx::query_as::<Postgres, UploadPart>(
            "SELECT * FROM upload_parts WHERE upload_id = $1 ORDER BY byte_offset",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(parts)
    }

    pub async fn delete_parts_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        upload_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM upload_parts WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Soft delete: the record stays in the table until the deletion worker
    /// confirms the backing bytes are gone.
    #[tracing::instrument(
        skip(self, tx),
        fields(db.table = "uploads", db.operation = "update", db.record_id = %id)
    )]
    pub async fn soft_delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        deleted_by: Option<Uuid>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE uploads SET is_deleted = TRUE, deleted_at = NOW(), deleted_by = $2
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(deleted_by)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Upload not found: {}", id)));
        }

        Ok(())
    }

    /// Hard delete: only invoked by the deletion worker after storage
    /// confirms byte removal. Cascades `upload_parts`.
    #[tracing::instrument(
        skip(self, tx),
        fields(db.table = "uploads", db.operation = "delete", db.record_id = %id)
    )]
    pub async fn hard_delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Total live bytes declared by an owner's uploads.
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    pub async fn total_size_for_owner(&self, user_id: Uuid) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size), 0)::BIGINT FROM uploads WHERE user_id = $1 AND is_deleted = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Uploads whose expiration passed before `cutoff` and that have not been
    /// deleted yet. Used by the worker's expired sweep.
    pub async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UploadRecord>, AppError> {
        let records = sqlx::query_as::<Postgres, UploadRecord>(
            r#"
            SELECT * FROM uploads
            WHERE expiration IS NOT NULL AND expiration < $1 AND is_deleted = FALSE
            ORDER BY expiration
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

//! Resumable upload protocol adapter (tus core protocol).
//!
//! HEAD reports the current offset, PATCH appends a chunk at the declared
//! offset, DELETE terminates an in-flight upload. Every request runs the
//! pre-request validation hook first: resolve the record, fail closed on
//! foreign ownership, and refuse mutation of uploads that already finished or
//! failed.
//!
//! Chunk placement goes through the storage abstraction under offset-addressed
//! part keys; metadata transitions are short transactions that never span the
//! byte transfer.

use crate::auth::models::UserContext;
use crate::error::HttpAppError;
use crate::events;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use dropkit_core::models::{UploadRecord, UploadStatus};
use dropkit_core::{AppError, EventCollector, UploadEvent};
use dropkit_db::with_transaction;
use dropkit_storage::keys::part_key;
use std::sync::Arc;
use uuid::Uuid;

/// Protocol version advertised and required on every request.
pub const TUS_VERSION: &str = "1.0.0";

/// PATCH bodies must carry this content type per the tus core protocol.
const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Pre-request validation hook, invoked before every non-creation request.
///
/// Fails closed: "not found" when no live record exists, "forbidden" when the
/// caller is not the owner, "conflict" when the upload already reached `done`
/// or `failed` (terminal uploads are immutable).
async fn validate_request(
    state: &Arc<AppState>,
    user: UserContext,
    id: Uuid,
) -> Result<UploadRecord, AppError> {
    let record = state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", id)))?;

    if record.user_id != user.user_id {
        return Err(AppError::Forbidden(format!(
            "Upload {} belongs to another user",
            id
        )));
    }

    if matches!(record.status, UploadStatus::Done | UploadStatus::Failed) {
        return Err(AppError::Conflict(format!(
            "Upload is already {}",
            record.status
        )));
    }

    Ok(record)
}

fn require_tus_version(headers: &HeaderMap) -> Result<(), AppError> {
    match headers.get("Tus-Resumable").and_then(|v| v.to_str().ok()) {
        Some(TUS_VERSION) | None => Ok(()),
        Some(other) => Err(AppError::Validation(format!(
            "Unsupported Tus-Resumable version: {}",
            other
        ))),
    }
}

/// Capability discovery.
pub async fn tus_options() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            ("Tus-Resumable", TUS_VERSION),
            ("Tus-Version", TUS_VERSION),
            ("Tus-Extension", "termination"),
        ],
    )
}

/// Report the current offset so an interrupted client can resume.
#[tracing::instrument(
    skip(state, headers),
    fields(user_id = %user.user_id, upload_id = %id, operation = "tus_head")
)]
pub async fn tus_head(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    require_tus_version(&headers)?;
    let record = validate_request(&state, user, id).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Tus-Resumable", TUS_VERSION)
        .header("Upload-Offset", record.upload_offset.to_string())
        .header("Upload-Length", record.size.to_string())
        .header(header::CACHE_CONTROL, "no-store")
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(response)
}

/// Accept one chunk at the declared offset.
#[tracing::instrument(
    skip(state, headers, body),
    fields(user_id = %user.user_id, upload_id = %id, operation = "tus_patch")
)]
pub async fn tus_patch(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpAppError> {
    require_tus_version(&headers)?;
    let record = validate_request(&state, user, id).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != OFFSET_OCTET_STREAM {
        return Err(HttpAppError::from(AppError::Validation(format!(
            "PATCH requires content type {}",
            OFFSET_OCTET_STREAM
        ))));
    }

    let offset: i64 = headers
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::Validation("Missing or invalid Upload-Offset header".to_string()))?;

    if offset != record.upload_offset {
        return Err(HttpAppError::from(AppError::Conflict(format!(
            "Expected offset {}, got {}",
            record.upload_offset, offset
        ))));
    }

    if body.is_empty() {
        return Err(HttpAppError::from(AppError::Validation(
            "Empty PATCH body".to_string(),
        )));
    }

    let chunk_len = body.len() as i64;
    if offset + chunk_len > record.size {
        return Err(HttpAppError::from(AppError::Validation(format!(
            "Chunk would exceed the declared size of {} bytes",
            record.size
        ))));
    }

    // Byte placement first, outside any transaction. The part key is
    // offset-addressed, so a retried PATCH overwrites its own object.
    let chunk_key = part_key(&record.file_key, offset);
    state
        .storage
        .put(&chunk_key, body)
        .await
        .map_err(HttpAppError::from)?;

    // Short, bounded metadata transaction. The offset compare-and-set
    // serializes concurrent PATCHes at the same offset: one wins, the other
    // gets a conflict.
    let repo = state.db.uploads.clone();
    let from = record.status;
    let new_offset = offset + chunk_len;
    let part_storage_key = chunk_key.clone();
    with_transaction(&state.db.pool, move |tx| {
        Box::pin(async move {
            if matches!(from, UploadStatus::Created | UploadStatus::Initiated) {
                repo.update_status_tx(tx, id, from, UploadStatus::Uploading)
                    .await?;
            }
            repo.update_offset_tx(tx, id, offset, new_offset).await?;
            repo.record_part_tx(tx, id, offset, &part_storage_key, chunk_len)
                .await?;
            Ok(())
        })
    })
    .await?;

    if new_offset == record.size {
        finalize_upload(&state, &record.file_key).await?;
    }

    let response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Tus-Resumable", TUS_VERSION)
        .header("Upload-Offset", new_offset.to_string())
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(response)
}

/// Completion callback: resolve the record by its storage key, assemble the
/// parts into the final object, and flip the record to `done`.
///
/// Re-invocation for an already-`done` record is a no-op. The declared size
/// stays untouched; offsets guarantee the assembled length matches it.
async fn finalize_upload(state: &Arc<AppState>, file_key: &str) -> Result<(), HttpAppError> {
    let record = state
        .db
        .uploads
        .get_by_file_key(file_key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No upload for storage key {}", file_key)))?;

    if record.status == UploadStatus::Done {
        return Ok(());
    }

    // Claim the assembly window; a concurrent finalizer loses the CAS.
    state
        .db
        .uploads
        .update_status(record.id, record.status, UploadStatus::Processing)
        .await?;

    let parts = state.db.uploads.get_parts(record.id).await?;

    // Concatenate parts in offset order. Bounded by the declared size checked
    // at PATCH time; streaming assembly (multipart server-side copy) is a
    // possible refinement for very large uploads.
    let mut assembled = Vec::with_capacity(record.size.max(0) as usize);
    for part in &parts {
        let chunk = match state.storage.read_all(&part.part_key).await {
            Ok(chunk) => chunk,
            Err(e) => {
                fail_assembly(state, record.id).await;
                return Err(HttpAppError::from(e));
            }
        };
        assembled.extend_from_slice(&chunk);
    }

    if let Err(e) = state
        .storage
        .put(file_key, axum::body::Bytes::from(assembled))
        .await
    {
        fail_assembly(state, record.id).await;
        return Err(HttpAppError::from(e));
    }

    // Part objects are no longer needed; failures here are cleanup-only and
    // the deletion worker removes leftovers with the upload.
    for part in &parts {
        if let Err(e) = state.storage.delete(&part.part_key).await {
            tracing::warn!(
                error = %e,
                part_key = %part.part_key,
                "Failed to delete part object during cleanup"
            );
        }
    }

    let repo = state.db.uploads.clone();
    let upload_id = record.id;
    with_transaction(&state.db.pool, move |tx| {
        Box::pin(async move {
            repo.delete_parts_tx(tx, upload_id).await?;
            repo.update_status_tx(tx, upload_id, UploadStatus::Processing, UploadStatus::Done)
                .await
        })
    })
    .await?;

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::Completed { upload_id });
    events::dispatch(&state.db.pool, collector).await;

    Ok(())
}

/// Mark an upload failed after an unrecoverable assembly error. The part
/// objects stay behind for the deletion worker to reap once the record is
/// deleted.
async fn fail_assembly(state: &Arc<AppState>, id: Uuid) {
    if let Err(e) = state
        .db
        .uploads
        .update_status(id, UploadStatus::Processing, UploadStatus::Failed)
        .await
    {
        tracing::error!(error = %e, upload_id = %id, "Failed to mark upload as failed");
    }
}

/// Terminate an in-flight upload: cancel, soft-delete, and enqueue removal of
/// whatever parts already landed.
#[tracing::instrument(
    skip(state, headers),
    fields(user_id = %user.user_id, upload_id = %id, operation = "tus_delete")
)]
pub async fn tus_delete(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    require_tus_version(&headers)?;
    let record = validate_request(&state, user, id).await?;

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::Cancelled { upload_id: id });
    collector.record(UploadEvent::DeletionRequested {
        upload_id: id,
        file_key: record.file_key.clone(),
        requested_at: chrono::Utc::now(),
    });

    let repo = state.db.uploads.clone();
    let outbox = state.db.outbox.clone();
    let from = record.status;
    let file_key = record.file_key.clone();
    let deleted_by = user.user_id;
    with_transaction(&state.db.pool, move |tx| {
        Box::pin(async move {
            repo.update_status_tx(tx, id, from, UploadStatus::Cancelled)
                .await?;
            repo.soft_delete_tx(tx, id, Some(deleted_by)).await?;
            outbox.enqueue_tx(tx, id, &file_key, Some(deleted_by)).await?;
            Ok(())
        })
    })
    .await?;

    events::dispatch(&state.db.pool, collector).await;

    let response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Tus-Resumable", TUS_VERSION)
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(response)
}

//! Upload lifecycle handlers: create, transfer (start/done), list, info,
//! usage, and delete.
//!
//! Every multi-step mutation runs inside a short transaction committed before
//! any externally visible side effect; lifecycle events are collected per
//! request and dispatched only after the commit succeeded.

use crate::auth::models::UserContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::events;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use dropkit_core::models::{
    CreateUploadRequest, CreateUploadResponse, ListUploadsQuery, ListUploadsResponse,
    TransferAckResponse, TransferAction, TransferRequest, TransferStartResponse,
    UploadInfoResponse, UploadRecord, UploadStatus, UploadSummary, UploadType, UsageResponse,
};
use dropkit_core::{presign_ttl, secret, AppError, EventCollector, UploadEvent};
use dropkit_db::with_transaction;
use dropkit_storage::keys::derive_file_key;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Pages are capped so a single listing cannot scan an owner's entire history.
const MAX_PAGE_SIZE: i64 = 100;

/// Create an upload record and decide the transfer mode.
#[utoipa::path(
    post,
    path = "/api/v0/uploads",
    tag = "uploads",
    request_body = CreateUploadRequest,
    responses(
        (status = 201, description = "Upload created", body = CreateUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(user_id = %user.user_id, operation = "create_upload")
)]
pub async fn create_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    request.validate().map_err(HttpAppError::from)?;

    let now = Utc::now();
    if let Some(expiration) = request.expiration {
        if expiration <= now {
            return Err(HttpAppError::from(AppError::Validation(
                "Expiration must be in the future".to_string(),
            )));
        }
    }

    // The plaintext secret is hashed here and never stored or logged.
    let secret_hash = match request.secret.as_deref() {
        Some(plain) => Some(secret::hash_secret(plain)?),
        None => None,
    };

    let extension = request.extension.trim_start_matches('.').to_lowercase();
    let upload_type = if state.storage.backend_type().is_local() {
        UploadType::Direct
    } else {
        UploadType::Presigned
    };

    // A duplicate file_key means the derivation collided, not that the insert
    // is wrong; retry once with a fresh id before giving up.
    let mut attempt = 0;
    let upload_id = loop {
        attempt += 1;
        let id = Uuid::new_v4();
        let record = UploadRecord {
            id,
            file_key: derive_file_key(user.user_id, now, id, &extension),
            status: UploadStatus::Created,
            file_name: request.file_name.clone(),
            content_type: request.content_type.clone(),
            extension: extension.clone(),
            size: request.size,
            upload_offset: 0,
            tags: request.tags.clone(),
            expiration: request.expiration,
            secret_hash: secret_hash.clone(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            user_id: user.user_id,
            created_at: now,
        };

        let repo = state.db.uploads.clone();
        let result = with_transaction(&state.db.pool, move |tx| {
            Box::pin(async move { repo.create_tx(tx, &record).await })
        })
        .await;

        match result {
            Ok(()) => break id,
            Err(AppError::Conflict(_)) if attempt < 2 => {
                tracing::warn!(attempt, "Storage key collision on create, re-deriving");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::Created {
        upload_id,
        user_id: user.user_id,
        upload_type,
    });
    events::dispatch(&state.db.pool, collector).await;

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            id: upload_id,
            upload_type,
        }),
    ))
}

/// Start or finalize a presigned transfer.
#[utoipa::path(
    post,
    path = "/api/v0/uploads/{id}/transfer",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload ID")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer URL issued or completion acknowledged"),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse),
        (status = 409, description = "Upload in a terminal state", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(user_id = %user.user_id, upload_id = %id, operation = "transfer")
)]
pub async fn transfer(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<TransferRequest>,
) -> Result<Response, HttpAppError> {
    let record = state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", id)))?;

    if record.user_id != user.user_id {
        return Err(HttpAppError::from(AppError::Forbidden(format!(
            "Upload {} belongs to another user",
            id
        ))));
    }

    match request.status {
        TransferAction::Start => start_transfer(&state, &record).await,
        TransferAction::Done => finish_transfer(&state, &record).await,
    }
}

/// Issue the transfer target and move the record forward.
///
/// Presigned mode hands out a signed PUT URL; the URL is generated first (no
/// side effect) but only leaves the handler after the status transition
/// committed, so a failed commit discards it. Direct mode points the client
/// at the resumable endpoint instead.
async fn start_transfer(
    state: &Arc<AppState>,
    record: &UploadRecord,
) -> Result<Response, HttpAppError> {
    if record.status.is_terminal() {
        return Err(HttpAppError::from(AppError::Conflict(format!(
            "Upload is already {}",
            record.status
        ))));
    }

    if state.storage.backend_type().is_local() {
        // Bytes go through the resumable adapter; the first accepted PATCH
        // moves the record to `uploading`.
        if record.status == UploadStatus::Created {
            let repo = state.db.uploads.clone();
            let id = record.id;
            with_transaction(&state.db.pool, move |tx| {
                Box::pin(async move {
                    repo.update_status_tx(tx, id, UploadStatus::Created, UploadStatus::Initiated)
                        .await
                })
            })
            .await?;
        }

        return Ok(Json(TransferStartResponse {
            urls: vec![format!("/api/v0/files/{}", record.id)],
            validity_in_minutes: 0,
        })
        .into_response());
    }

    let ttl = presign_ttl(record.size.max(0) as u64);
    let url = state
        .storage
        .presign_put(&record.file_key, &record.content_type, ttl)
        .await
        .map_err(HttpAppError::from)?;

    // Re-requesting a URL for an already-uploading record (e.g. the first one
    // expired mid-transfer) skips the transition and just issues a fresh URL.
    if record.status != UploadStatus::Uploading {
        let repo = state.db.uploads.clone();
        let id = record.id;
        let from = record.status;
        with_transaction(&state.db.pool, move |tx| {
            Box::pin(async move {
                repo.update_status_tx(tx, id, from, UploadStatus::Uploading)
                    .await
            })
        })
        .await?;
    }

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::TransferStarted {
        upload_id: record.id,
    });
    events::dispatch(&state.db.pool, collector).await;

    Ok(Json(TransferStartResponse {
        urls: vec![url],
        validity_in_minutes: (ttl.as_secs() / 60) as i64,
    })
    .into_response())
}

/// Acknowledge a presigned upload: verify the object landed, then flip the
/// record to `done`. Re-invoking on an already-`done` record is a no-op.
async fn finish_transfer(
    state: &Arc<AppState>,
    record: &UploadRecord,
) -> Result<Response, HttpAppError> {
    if record.status == UploadStatus::Done {
        return Ok(Json(TransferAckResponse { complete: true }).into_response());
    }
    if record.status.is_terminal() {
        return Err(HttpAppError::from(AppError::Conflict(format!(
            "Upload is already {}",
            record.status
        ))));
    }

    // Object existence, not length: the declared size stays authoritative.
    let exists = state
        .storage
        .exists(&record.file_key)
        .await
        .map_err(HttpAppError::from)?;
    if !exists {
        return Err(HttpAppError::from(AppError::NotFound(format!(
            "No uploaded object found for upload {}",
            record.id
        ))));
    }

    let repo = state.db.uploads.clone();
    let id = record.id;
    let from = record.status;
    with_transaction(&state.db.pool, move |tx| {
        Box::pin(async move {
            // A client may acknowledge without ever requesting a URL; walk the
            // record through `uploading` so the DAG stays intact.
            let from = match from {
                UploadStatus::Created | UploadStatus::Initiated => {
                    repo.update_status_tx(tx, id, from, UploadStatus::Uploading)
                        .await?;
                    UploadStatus::Uploading
                }
                other => other,
            };
            repo.update_status_tx(tx, id, from, UploadStatus::Done).await
        })
    })
    .await?;

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::Completed { upload_id: id });
    events::dispatch(&state.db.pool, collector).await;

    Ok(Json(TransferAckResponse { complete: true }).into_response())
}

/// Owner-scoped listing with a windowed page and the total count.
#[utoipa::path(
    get,
    path = "/api/v0/uploads",
    tag = "uploads",
    params(
        ("skip" = Option<i64>, Query, description = "Rows to skip"),
        ("take" = Option<i64>, Query, description = "Page size (max 100)")
    ),
    responses(
        (status = 200, description = "Page of uploads", body = ListUploadsResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(user_id = %user.user_id, operation = "list_uploads"))]
pub async fn list_uploads(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUploadsQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let skip = query.skip.max(0);
    let take = query.take.clamp(1, MAX_PAGE_SIZE);

    let (records, total) = state.db.uploads.list(user.user_id, skip, take).await?;
    let items: Vec<UploadSummary> = records.iter().map(UploadSummary::from).collect();

    Ok(Json(ListUploadsResponse { items, total }))
}

/// Upload metadata by id. Reveals whether a secret gates content access but
/// never the secret hash itself.
#[utoipa::path(
    get,
    path = "/api/v0/uploads/{id}/info",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Upload metadata", body = UploadInfoResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(upload_id = %id, operation = "get_upload_info"))]
pub async fn get_upload_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let record = state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", id)))?;

    Ok(Json(UploadInfoResponse::from(&record)))
}

/// Total declared bytes of the caller's live uploads.
#[utoipa::path(
    get,
    path = "/api/v0/uploads/usage",
    tag = "uploads",
    responses(
        (status = 200, description = "Owner storage footprint", body = UsageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(user_id = %user.user_id, operation = "get_usage"))]
pub async fn get_usage(
    user: UserContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let total_bytes = state.db.uploads.total_size_for_owner(user.user_id).await?;
    Ok(Json(UsageResponse { total_bytes }))
}

/// Soft-delete an upload and enqueue the byte removal.
///
/// The request transaction commits the soft delete and the outbox row
/// together; slow storage I/O happens later in the deletion worker, which
/// hard-deletes the metadata only after the bytes are confirmed gone.
#[utoipa::path(
    delete,
    path = "/api/v0/uploads/{id}",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Deletion requested", body = bool),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state),
    fields(user_id = %user.user_id, upload_id = %id, operation = "delete_upload")
)]
pub async fn delete_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<bool>, HttpAppError> {
    let record = state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", id)))?;

    if record.user_id != user.user_id {
        return Err(HttpAppError::from(AppError::Forbidden(format!(
            "Upload {} belongs to another user",
            id
        ))));
    }

    let mut collector = EventCollector::new();
    collector.record(UploadEvent::DeletionRequested {
        upload_id: id,
        file_key: record.file_key.clone(),
        requested_at: Utc::now(),
    });

    let repo = state.db.uploads.clone();
    let outbox = state.db.outbox.clone();
    let file_key = record.file_key.clone();
    let deleted_by = user.user_id;
    with_transaction(&state.db.pool, move |tx| {
        Box::pin(async move {
            repo.soft_delete_tx(tx, id, Some(deleted_by)).await?;
            outbox.enqueue_tx(tx, id, &file_key, Some(deleted_by)).await?;
            Ok(())
        })
    })
    .await?;

    // Dispatch strictly after commit: a rolled-back delete must never reach
    // the deletion worker.
    events::dispatch(&state.db.pool, collector).await;

    Ok(Json(true))
}

//! Content access gate.
//!
//! Resolves a completed upload to retrievable content: a byte stream for the
//! local backend, a short-lived presigned redirect for object stores. Missing,
//! unfinished, deleted, and expired uploads are all the same 404 so existence
//! never leaks; secret verification goes through the hash scheme's own
//! comparison.

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use dropkit_core::models::UploadRecord;
use dropkit_core::{presign_ttl, secret, AppError};
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ContentQuery {
    /// Plaintext access secret, required when the upload was created with one
    pub secret: Option<String>,
}

/// Dual-mode gate result: callers must handle both shapes.
pub enum ContentAccess {
    /// Local backend: the caller serves the bytes itself.
    Stream {
        stream: dropkit_storage::ByteStream,
        content_type: String,
        file_name: String,
        size: i64,
    },
    /// Remote backend: the caller redirects to a short-lived presigned URL.
    Redirect { url: String },
}

/// Serve upload content: stream (local backend) or redirect (object store).
#[utoipa::path(
    get,
    path = "/api/v0/uploads/{id}/content",
    tag = "content",
    params(
        ("id" = Uuid, Path, description = "Upload ID"),
        ContentQuery
    ),
    responses(
        (status = 200, description = "Content bytes", content_type = "application/octet-stream"),
        (status = 302, description = "Redirect to a presigned URL"),
        (status = 403, description = "Secret required or invalid", body = ErrorResponse),
        (status = 404, description = "Missing, expired, or not completed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query), fields(upload_id = %id, operation = "get_content"))]
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ContentQuery>,
) -> Result<Response, HttpAppError> {
    let record = state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", id)))?;

    // Expired or not-yet-done reads exactly like absent.
    if !record.is_retrievable(Utc::now()) {
        return Err(HttpAppError::from(AppError::NotFound(format!(
            "Upload not retrievable: {}",
            id
        ))));
    }

    if let Some(ref hash) = record.secret_hash {
        let supplied = query.secret.as_deref().ok_or_else(|| {
            AppError::Forbidden(format!("Secret required for upload {}", id))
        })?;
        if !secret::verify_secret(supplied, hash)? {
            return Err(HttpAppError::from(AppError::Forbidden(format!(
                "Wrong secret for upload {}",
                id
            ))));
        }
    }

    let access = resolve_content(&state, &record).await?;
    access_to_response(access)
}

/// Resolve a retrievable record to its access mode.
async fn resolve_content(
    state: &Arc<AppState>,
    record: &UploadRecord,
) -> Result<ContentAccess, HttpAppError> {
    if state.storage.backend_type().is_local() {
        let stream = state
            .storage
            .read(&record.file_key)
            .await
            .map_err(HttpAppError::from)?;

        Ok(ContentAccess::Stream {
            stream,
            content_type: record.content_type.clone(),
            file_name: record.file_name.clone(),
            size: record.size,
        })
    } else {
        // Same size-aware window as the upload side, parameterized for GET.
        let ttl = presign_ttl(record.size.max(0) as u64);
        let url = state
            .storage
            .presign_get(&record.file_key, ttl)
            .await
            .map_err(HttpAppError::from)?;

        Ok(ContentAccess::Redirect { url })
    }
}

fn access_to_response(access: ContentAccess) -> Result<Response, HttpAppError> {
    let response = match access {
        ContentAccess::Stream {
            stream,
            content_type,
            file_name,
            size,
        } => {
            let body_stream = stream.map(|result| {
                result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
            });

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_DISPOSITION, content_disposition(&file_name))
                .header(header::CONTENT_LENGTH, size.to_string())
                .header(header::CACHE_CONTROL, "private, no-store")
                .body(Body::from_stream(body_stream))
                .map_err(|e| AppError::Internal(e.to_string()))?
        }
        ContentAccess::Redirect { url } => Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, url)
            .header(header::CACHE_CONTROL, "private, no-store")
            .body(Body::empty())
            .map_err(|e| AppError::Internal(e.to_string()))?,
    };

    Ok(response)
}

/// Attachment disposition with both the quoted fallback and the RFC 5987
/// UTF-8 form, so non-ASCII filenames survive.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let encoded = utf8_percent_encode(file_name, NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_disposition_escapes_quotes() {
        let header = content_disposition("a\"b.png");
        assert!(header.contains("filename=\"a_b.png\""));
    }

    #[test]
    fn content_disposition_keeps_plain_names() {
        let header = content_disposition("report.pdf");
        assert!(header.starts_with("attachment; filename=\"report.pdf\""));
    }

    #[test]
    fn content_disposition_encodes_unicode() {
        let header = content_disposition("résumé.pdf");
        assert!(header.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%2Epdf"));
    }
}

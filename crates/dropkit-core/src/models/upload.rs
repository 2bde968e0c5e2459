use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Upload lifecycle status.
///
/// Transitions form a DAG: `created → initiated → uploading → {done | failed |
/// cancelled}`, with `processing` as an optional step between `uploading` and
/// `done`. Forward progression only; `done`, `failed`, and `cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "upload_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Created,
    Initiated,
    Uploading,
    Processing,
    Done,
    Cancelled,
    Failed,
}

impl UploadStatus {
    /// Terminal states admit no further status mutation (only soft/hard delete).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Done | UploadStatus::Cancelled | UploadStatus::Failed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Created, Initiated | Uploading | Cancelled | Failed)
                | (Initiated, Uploading | Cancelled | Failed)
                | (Uploading, Processing | Done | Cancelled | Failed)
                | (Processing, Done | Cancelled | Failed)
        )
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            UploadStatus::Created => "created",
            UploadStatus::Initiated => "initiated",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Done => "done",
            UploadStatus::Cancelled => "cancelled",
            UploadStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Transfer mode decided at creation: local backends stream bytes through the
/// server, remote backends hand the client a presigned URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    Direct,
    Presigned,
}

/// Persisted upload record, one row in the `uploads` table.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub id: Uuid,
    /// Storage-backend key, derived from owner + creation date + id +
    /// extension. Unique and immutable once set.
    pub file_key: String,
    pub status: UploadStatus,
    pub file_name: String,
    pub content_type: String,
    pub extension: String,
    /// Declared byte size at creation. Authoritative for presign-expiry
    /// calculation; not reconciled against actual bytes transferred.
    pub size: i64,
    /// Resumable-protocol progress in bytes.
    pub upload_offset: i64,
    pub tags: Vec<String>,
    pub expiration: Option<DateTime<Utc>>,
    /// Argon2 PHC string of the access secret. Never plaintext.
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl UploadRecord {
    /// Whether the record's expiration timestamp has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp < now)
    }

    /// Content is retrievable only for completed, live, unexpired records.
    pub fn is_retrievable(&self, now: DateTime<Utc>) -> bool {
        self.status == UploadStatus::Done && !self.is_deleted && !self.is_expired(now)
    }
}

#[cfg(feature = "sqlx")]
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UploadRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let tags_json: serde_json::Value = row.try_get("tags")?;
        let tags = serde_json::from_value(tags_json).map_err(|e| sqlx::Error::ColumnDecode {
            index: "tags".to_string(),
            source: Box::new(e),
        })?;

        Ok(UploadRecord {
            id: row.try_get("id")?,
            file_key: row.try_get("file_key")?,
            status: row.try_get("status")?,
            file_name: row.try_get("file_name")?,
            content_type: row.try_get("content_type")?,
            extension: row.try_get("extension")?,
            size: row.try_get("size")?,
            upload_offset: row.try_get("upload_offset")?,
            tags,
            expiration: row.try_get("expiration")?,
            secret_hash: row.try_get("secret_hash")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: row.try_get("deleted_by")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Request to create an upload
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUploadRequest {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub file_name: String,
    /// File extension without the leading dot
    #[validate(length(
        min = 1,
        max = 32,
        message = "Extension must be between 1 and 32 characters"
    ))]
    pub extension: String,
    /// Declared file size in bytes
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub size: i64,
    /// Free-form labels, order preserved
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content type (MIME type)
    #[validate(length(
        min = 1,
        max = 255,
        message = "Content type must be between 1 and 255 characters"
    ))]
    pub content_type: String,
    /// Absolute timestamp after which content access fails; omit for no expiry
    pub expiration: Option<DateTime<Utc>>,
    /// Optional access secret, hashed at creation and discarded
    #[validate(length(min = 4, message = "Secret must be at least 4 characters"))]
    pub secret: Option<String>,
}

/// Response after creating an upload
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateUploadResponse {
    pub id: Uuid,
    pub upload_type: UploadType,
}

/// Transfer phase requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Start,
    Done,
}

/// Request to start or finalize a transfer
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub status: TransferAction,
}

/// Response to `"start"`: upload target URL(s) and their validity window
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferStartResponse {
    pub urls: Vec<String>,
    pub validity_in_minutes: i64,
}

/// Response to `"done"`
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferAckResponse {
    pub complete: bool,
}

/// Listing window
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListUploadsQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
}

fn default_take() -> i64 {
    50
}

/// One row of an owner-scoped listing
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadSummary {
    pub id: Uuid,
    pub file_name: String,
    pub size: i64,
    pub status: UploadStatus,
    pub expiration: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UploadRecord> for UploadSummary {
    fn from(record: &UploadRecord) -> Self {
        UploadSummary {
            id: record.id,
            file_name: record.file_name.clone(),
            size: record.size,
            status: record.status,
            expiration: record.expiration,
            tags: record.tags.clone(),
            content_type: record.content_type.clone(),
            created_at: record.created_at,
        }
    }
}

/// Owner-scoped page plus single-round-trip total
#[derive(Debug, Serialize, ToSchema)]
pub struct ListUploadsResponse {
    pub items: Vec<UploadSummary>,
    pub total: i64,
}

/// Upload metadata for the info endpoint. `secure` reports whether a secret
/// gates content access; the hash itself is never exposed.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadInfoResponse {
    pub id: Uuid,
    pub name: String,
    pub size: i64,
    pub expiration: Option<DateTime<Utc>>,
    pub secure: bool,
    pub status: UploadStatus,
    pub tags: Vec<String>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UploadRecord> for UploadInfoResponse {
    fn from(record: &UploadRecord) -> Self {
        UploadInfoResponse {
            id: record.id,
            name: record.file_name.clone(),
            size: record.size,
            expiration: record.expiration,
            secure: record.secret_hash.is_some(),
            status: record.status,
            tags: record.tags.clone(),
            content_type: record.content_type.clone(),
            created_at: record.created_at,
        }
    }
}

/// Owner storage footprint
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    pub total_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: UploadStatus, expiration: Option<DateTime<Utc>>) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            file_key: "u/2026/08/07/x.png".to_string(),
            status,
            file_name: "x.png".to_string(),
            content_type: "image/png".to_string(),
            extension: "png".to_string(),
            size: 1024,
            upload_offset: 0,
            tags: vec![],
            expiration,
            secret_hash: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn forward_transitions_allowed() {
        use UploadStatus::*;
        assert!(Created.can_transition_to(Initiated));
        assert!(Created.can_transition_to(Uploading));
        assert!(Initiated.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Processing));
        assert!(Uploading.can_transition_to(Done));
        assert!(Processing.can_transition_to(Done));
    }

    #[test]
    fn no_transition_back_to_created() {
        use UploadStatus::*;
        for from in [Initiated, Uploading, Processing, Done, Cancelled, Failed] {
            assert!(!from.can_transition_to(Created), "{from} -> created");
        }
    }

    #[test]
    fn terminal_states_are_fixed_points() {
        use UploadStatus::*;
        for from in [Done, Cancelled, Failed] {
            assert!(from.is_terminal());
            for to in [Created, Initiated, Uploading, Processing, Done, Cancelled, Failed] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn cancel_and_fail_reachable_from_every_live_state() {
        use UploadStatus::*;
        for from in [Created, Initiated, Uploading, Processing] {
            assert!(from.can_transition_to(Cancelled));
            assert!(from.can_transition_to(Failed));
        }
    }

    #[test]
    fn expired_record_is_not_retrievable() {
        let now = Utc::now();
        let rec = record(UploadStatus::Done, Some(now - chrono::Duration::hours(1)));
        assert!(rec.is_expired(now));
        assert!(!rec.is_retrievable(now));
    }

    #[test]
    fn done_live_record_is_retrievable() {
        let now = Utc::now();
        let rec = record(UploadStatus::Done, Some(now + chrono::Duration::hours(1)));
        assert!(rec.is_retrievable(now));

        let no_expiry = record(UploadStatus::Done, None);
        assert!(no_expiry.is_retrievable(now));
    }

    #[test]
    fn incomplete_record_is_not_retrievable() {
        let now = Utc::now();
        for status in [
            UploadStatus::Created,
            UploadStatus::Uploading,
            UploadStatus::Processing,
            UploadStatus::Failed,
        ] {
            assert!(!record(status, None).is_retrievable(now));
        }
    }

    #[test]
    fn create_request_validation() {
        let valid = CreateUploadRequest {
            file_name: "a.png".to_string(),
            extension: "png".to_string(),
            size: 1024,
            tags: vec![],
            content_type: "image/png".to_string(),
            expiration: None,
            secret: None,
        };
        assert!(valid.validate().is_ok());

        let zero_size = CreateUploadRequest { size: 0, ..valid };
        assert!(zero_size.validate().is_err());

        let short_secret = CreateUploadRequest {
            size: 1024,
            secret: Some("abc".to_string()),
            ..zero_size
        };
        assert!(short_secret.validate().is_err());
    }
}

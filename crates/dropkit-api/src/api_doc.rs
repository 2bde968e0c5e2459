//! OpenAPI document, served as plain JSON at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use dropkit_core::models::{
    CreateUploadRequest, CreateUploadResponse, ListUploadsResponse, TransferAckResponse,
    TransferAction, TransferRequest, TransferStartResponse, UploadInfoResponse, UploadStatus,
    UploadSummary, UploadType, UsageResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::uploads::create_upload,
        crate::handlers::uploads::transfer,
        crate::handlers::uploads::list_uploads,
        crate::handlers::uploads::get_upload_info,
        crate::handlers::uploads::get_usage,
        crate::handlers::uploads::delete_upload,
        crate::handlers::content::get_content,
    ),
    components(schemas(
        CreateUploadRequest,
        CreateUploadResponse,
        TransferRequest,
        TransferAction,
        TransferStartResponse,
        TransferAckResponse,
        ListUploadsResponse,
        UploadSummary,
        UploadInfoResponse,
        UsageResponse,
        UploadStatus,
        UploadType,
        ErrorResponse,
    )),
    tags(
        (name = "uploads", description = "Upload lifecycle"),
        (name = "content", description = "Content access")
    )
)]
pub struct ApiDoc;

//! RAW footage routes (object-store multipart uploads)
//!
//! Endpoints:
//! - POST /api/upload/r2/init - Open a multipart upload
//! - POST /api/upload/r2/part-url - Presigned URL for a direct part PUT
//! - PUT /api/upload/r2/part/:upload_id?key=&partNumber= - Upload a part through the server
//! - POST /api/upload/r2/complete/:upload_id - Assemble the object
//! - DELETE /api/upload/r2/abort/:upload_id?key= - Abort the upload
//! - GET /api/upload/r2/download?key=&expiresIn= - Presigned download URL

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{declared_size, ok, ApiResponse};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{CompletedPart, CompletedUpload, MultipartInit, PresignedUrl};
use crate::upload::SessionMetadata;

/// Default lifetime of presigned URLs, in seconds
const DEFAULT_EXPIRES_IN: u64 = 3600;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/init", post(init_upload))
        .route("/part-url", post(part_url))
        .route("/part/:upload_id", put(upload_part))
        .route("/complete/:upload_id", post(complete_upload))
        .route("/abort/:upload_id", delete(abort_upload))
        .route("/download", get(download_url))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    #[serde(default)]
    pub filename: String,
    pub file_size: Option<i64>,
    #[serde(default)]
    pub client_metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlRequest {
    pub upload_id: String,
    pub key: String,
    pub part_number: i32,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlResponse {
    pub url: String,
    pub part_number: i32,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartQuery {
    pub key: Option<String>,
    pub part_number: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResponse {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortResponse {
    pub upload_id: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub key: Option<String>,
    pub expires_in: Option<u64>,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| AppError::InvalidInput(format!("{} is required", name)))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload/r2/init
async fn init_upload(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> Result<Json<ApiResponse<MultipartInit>>> {
    let file_size = request
        .file_size
        .map(|size| declared_size(&state, size))
        .transpose()?;

    let init = state
        .multipart()
        .begin_upload(&request.filename, file_size, &request.client_metadata)
        .await?;

    Ok(ok(init))
}

/// POST /api/upload/r2/part-url
async fn part_url(
    State(state): State<AppState>,
    Json(request): Json<PartUrlRequest>,
) -> Result<Json<ApiResponse<PartUrlResponse>>> {
    let expires_in = request.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    let url = state
        .multipart()
        .presign_part(&request.upload_id, &request.key, request.part_number, expires_in)
        .await?;

    Ok(ok(PartUrlResponse {
        url,
        part_number: request.part_number,
        expires_in,
    }))
}

/// PUT /api/upload/r2/part/:upload_id
async fn upload_part(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Query(query): Query<PartQuery>,
    body: Bytes,
) -> Result<(HeaderMap, Json<ApiResponse<PartResponse>>)> {
    let key = required(query.key, "key")?;
    let part_number = required(query.part_number, "partNumber")?;
    if body.is_empty() {
        return Err(AppError::InvalidInput("part body is empty".to_string()));
    }

    let etag = state
        .multipart()
        .upload_part(&upload_id, &key, part_number, body)
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }

    Ok((headers, ok(PartResponse { part_number, etag })))
}

/// POST /api/upload/r2/complete/:upload_id
async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<ApiResponse<CompletedUpload>>> {
    let completed = state
        .multipart()
        .complete_upload(&upload_id, &request.key, request.parts)
        .await?;

    Ok(ok(completed))
}

/// DELETE /api/upload/r2/abort/:upload_id
async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ApiResponse<AbortResponse>>> {
    let key = required(query.key, "key")?;
    state.multipart().abort_upload(&upload_id, &key).await?;

    Ok(ok(AbortResponse { upload_id, key }))
}

/// GET /api/upload/r2/download
async fn download_url(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<ApiResponse<PresignedUrl>>> {
    let key = required(query.key, "key")?;
    let expires_in = query.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);

    let url = state.multipart().presign_download(&key, expires_in).await?;

    Ok(ok(PresignedUrl { url, expires_in }))
}

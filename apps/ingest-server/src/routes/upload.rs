//! Upload Routes
//!
//! HTTP endpoints for resumable chunked uploads.
//!
//! Endpoints:
//! - POST /api/upload/create - Classify the file and open a session on the matching backend
//! - PATCH /api/upload/chunk/:id - Append a chunk at `Upload-Offset`
//! - HEAD /api/upload/chunk/:id - Current offset, for resuming
//! - GET /api/upload/status/:id - Session status
//! - POST /api/upload/finalize/:id - Move a completed upload to project storage
//! - DELETE /api/upload/chunk/:id - Abort a session

use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{declared_size, ok, ApiResponse};
use crate::error::{AppError, Result};
use crate::format::MediaClass;
use crate::probe::MediaInfo;
use crate::state::AppState;
use crate::tus;
use crate::upload::{ChunkProgress, SessionMetadata, SessionStatus, SessionView, DEFAULT_CHUNK_SIZE};

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_upload))
        .route(
            "/chunk/:id",
            patch(upload_chunk).head(chunk_offset).delete(abort_upload),
        )
        .route("/status/:id", get(get_status))
        .route("/finalize/:id", post(finalize_upload))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    #[serde(default)]
    pub filename: String,
    /// Falls back to the `Upload-Length` header
    pub file_size: Option<i64>,
    #[serde(default)]
    pub client_metadata: SessionMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    /// Chunked through this server, delivered to the media platform
    Tus,
    /// Multipart straight into the object store
    R2,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub upload_url: String,
    pub upload_type: UploadType,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub upload_id: String,
    pub final_path: PathBuf,
    pub file_size: u64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_info: Option<MediaInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortResponse {
    pub upload_id: String,
    pub status: SessionStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload/create
///
/// RAW formats get a multipart upload in the object store; everything else a
/// local chunked session.
async fn create_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<CreateUploadRequest>,
) -> Result<impl IntoResponse> {
    apply_upload_metadata(&mut request, &headers)?;

    if request.filename.trim().is_empty() {
        return Err(AppError::InvalidInput("filename is required".to_string()));
    }
    let declared = match request.file_size {
        Some(size) => size,
        None => tus::parse_u64_header(&headers, &tus::UPLOAD_LENGTH)?
            .and_then(|len| i64::try_from(len).ok())
            .ok_or_else(|| AppError::InvalidInput("fileSize is required".to_string()))?,
    };
    let file_size = declared_size(&state, declared)?;

    match state.format_router().classify(&request.filename)? {
        MediaClass::Raw => {
            let init = state
                .multipart()
                .begin_upload(&request.filename, Some(file_size), &request.client_metadata)
                .await?;

            let response = CreateUploadResponse {
                upload_url: format!(
                    "/api/upload/r2/part/{}?key={}",
                    urlencoding::encode(&init.upload_id),
                    urlencoding::encode(&init.key)
                ),
                upload_id: init.upload_id,
                upload_type: UploadType::R2,
                file_size,
                chunk_size: None,
                key: Some(init.key),
                bucket: Some(init.bucket),
            };

            Ok((StatusCode::CREATED, tus_headers(), ok(response)))
        }
        MediaClass::Stream => {
            let session = state
                .sessions()
                .create_session(&request.filename, declared, request.client_metadata)
                .await?;

            let upload_url = format!("/api/upload/chunk/{}", session.id);
            let mut headers = tus_headers();
            if let Ok(location) = HeaderValue::from_str(&upload_url) {
                headers.insert(header::LOCATION, location);
            }

            let response = CreateUploadResponse {
                upload_id: session.id,
                upload_url,
                upload_type: UploadType::Tus,
                file_size: session.total_size,
                chunk_size: Some(DEFAULT_CHUNK_SIZE),
                key: None,
                bucket: None,
            };

            Ok((StatusCode::CREATED, headers, ok(response)))
        }
    }
}

/// Fill gaps in the JSON body from a TUS `Upload-Metadata` header
///
/// Body fields win. Recognised keys: `filename`/`name`, `filetype`/`contentType`,
/// `clientEmail`, `projectName`; anything else lands in the extra metadata.
fn apply_upload_metadata(request: &mut CreateUploadRequest, headers: &HeaderMap) -> Result<()> {
    let Some(raw) = headers.get(&tus::UPLOAD_METADATA) else {
        return Ok(());
    };
    let raw = raw
        .to_str()
        .map_err(|_| AppError::InvalidInput("Upload-Metadata is not ASCII".to_string()))?;
    let meta = tus::TusMetadata::decode(raw)?;

    let fill = |slot: &mut Option<String>, value: &str| {
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    };

    let metadata = &mut request.client_metadata;
    for (key, value) in meta.iter() {
        match key {
            "filename" | "name" => {
                if request.filename.trim().is_empty() {
                    request.filename = value.to_string();
                }
            }
            "filetype" | "contentType" => fill(&mut metadata.content_type, value),
            "clientEmail" => fill(&mut metadata.client_email, value),
            "projectName" => fill(&mut metadata.project_name, value),
            other => {
                metadata
                    .extra
                    .entry(other.to_string())
                    .or_insert_with(|| serde_json::Value::String(value.to_string()));
            }
        }
    }

    Ok(())
}

/// PATCH /api/upload/chunk/:id
///
/// The chunk is the raw request body; `Upload-Offset` must equal the bytes received so far.
async fn upload_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(HeaderMap, Json<ApiResponse<ChunkProgress>>)> {
    let offset = tus::parse_u64_header(&headers, &tus::UPLOAD_OFFSET)?
        .ok_or_else(|| AppError::InvalidInput("Upload-Offset header is required".to_string()))?;

    let progress = state.sessions().write_chunk(&id, offset, &body).await?;

    tracing::debug!(
        session_id = %id,
        offset,
        size = body.len(),
        progress = format!("{:.1}%", progress.progress),
        "Chunk uploaded"
    );

    let mut response_headers = tus_headers();
    response_headers.insert(tus::UPLOAD_OFFSET, HeaderValue::from(progress.bytes_uploaded));

    Ok((response_headers, ok(progress)))
}

/// HEAD /api/upload/chunk/:id
async fn chunk_offset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<HeaderMap> {
    let session = state.sessions().status(&id).await?;

    let mut headers = tus_headers();
    headers.insert(tus::UPLOAD_OFFSET, HeaderValue::from(session.bytes_received));
    headers.insert(tus::UPLOAD_LENGTH, HeaderValue::from(session.total_size));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(headers)
}

/// GET /api/upload/status/:id
async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>> {
    let session = state.sessions().status(&id).await?;
    Ok(ok(session.view()))
}

/// POST /api/upload/finalize/:id
async fn finalize_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FinalizeResponse>>> {
    let session = state.sessions().status(&id).await?;
    let destination = final_destination(&state.config().upload.final_dir, &id, &session.filename);

    let session = state.sessions().finalize(&id, &destination).await?;
    let final_path = session.final_path.clone().unwrap_or(destination);

    let media_info = match state.probe() {
        Some(probe) => match probe.probe(&final_path).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Media probe failed");
                None
            }
        },
        None => None,
    };

    Ok(ok(FinalizeResponse {
        upload_id: session.id,
        final_path,
        file_size: session.total_size,
        status: session.status,
        media_info,
    }))
}

/// DELETE /api/upload/chunk/:id
async fn abort_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AbortResponse>>> {
    let session = state.sessions().abort(&id).await?;
    Ok(ok(AbortResponse {
        upload_id: session.id,
        status: session.status,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn tus_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(tus::TUS_RESUMABLE, HeaderValue::from_static(tus::TUS_VERSION));
    headers
}

/// `<final_dir>/<id>_<filename>`, keeping only the last path component of the client's name
fn final_destination(final_dir: &FsPath, id: &str, filename: &str) -> PathBuf {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("upload");
    final_dir.join(format!("{}_{}", id, name))
}

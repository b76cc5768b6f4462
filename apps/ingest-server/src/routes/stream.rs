//! Delivery-format routes (media platform)
//!
//! Endpoints:
//! - POST /api/stream/upload-url - Basic or resumable upload URL, by size
//! - POST /api/stream/relay - Relay a multipart `file` field into a resumable session
//! - GET /api/stream/video/:uid - Processing status

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;

use super::{ok, ApiResponse};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::stream::{RelayOutcome, UploadUrl, VideoStatus};
use crate::tus;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-url", post(upload_url))
        .route(
            "/relay",
            post(relay_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/video/:uid", get(video_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_size: Option<i64>,
    pub file_name: Option<String>,
    pub max_duration_seconds: Option<u32>,
}

/// POST /api/stream/upload-url
async fn upload_url(
    State(state): State<AppState>,
    Json(request): Json<UploadUrlRequest>,
) -> Result<Json<ApiResponse<UploadUrl>>> {
    let file_size = match request.file_size {
        Some(size) if size > 0 => size as u64,
        Some(size) => {
            return Err(AppError::InvalidInput(format!(
                "fileSize must be positive, got {}",
                size
            )))
        }
        None => return Err(AppError::InvalidInput("fileSize is required".to_string())),
    };

    let upload = state
        .stream()
        .upload_url(
            file_size,
            request.file_name.as_deref(),
            request.max_duration_seconds,
        )
        .await?;

    tracing::info!(
        video_id = %upload.video_id,
        file_size,
        upload_type = ?upload.upload_type,
        "Issued stream upload URL"
    );

    Ok(ok(upload))
}

/// POST /api/stream/relay
///
/// With `Upload-Length` the body is streamed straight through; without it the
/// field is spooled to disk first so its exact size can be declared.
async fn relay_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<RelayOutcome>>> {
    let declared = tus::parse_u64_header(&headers, &tus::UPLOAD_LENGTH)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let body = field.map(|chunk| chunk.map_err(|e| AppError::InvalidInput(e.body_text())));

        let outcome = match declared {
            Some(length) => state.relay().relay(&filename, length, body).await?,
            None => {
                let spool_dir = state.config().upload.temp_dir.join("relay");
                state
                    .relay()
                    .relay_unsized(&filename, &spool_dir, body)
                    .await?
            }
        };

        return Ok(ok(outcome));
    }

    Err(AppError::InvalidInput(
        "multipart field 'file' is required".to_string(),
    ))
}

/// GET /api/stream/video/:uid
async fn video_status(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<VideoStatus>>> {
    let status = state.stream().video_status(&uid).await?;
    Ok(ok(status))
}

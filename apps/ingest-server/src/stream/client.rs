//! Media platform HTTP client
//!
//! Issues direct-upload URLs, opens and feeds resumable sessions, and reads
//! back video processing state. Every request carries its own timeout.

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use super::relay::{video_id_from_url, ResumableTarget};
use super::types::{ApiEnvelope, DirectUpload, UploadType, UploadUrl, VideoRecord, VideoStatus};
use crate::config::{StreamConfig, TimeoutConfig};
use crate::error::{AppError, Result};
use crate::tus::{TusMetadata, OFFSET_OCTET_STREAM, TUS_VERSION};

/// How long an issued upload URL is advertised as valid
const UPLOAD_URL_LIFETIME_HOURS: i64 = 24;

#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    api_base: String,
    account_id: String,
    api_token: String,
    basic_upload_limit: u64,
    max_duration_seconds: u32,
    timeouts: TimeoutConfig,
}

impl StreamClient {
    pub fn new(config: &StreamConfig, timeouts: TimeoutConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.control())
            .user_agent(concat!("ingest-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            api_token: config.api_token.clone(),
            basic_upload_limit: config.basic_upload_limit,
            max_duration_seconds: config.max_duration_seconds,
            timeouts,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.account_id.is_empty() && !self.api_token.is_empty()
    }

    pub fn max_duration_seconds(&self) -> u32 {
        self.max_duration_seconds
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(AppError::Internal(
                "Media platform credentials are not configured".to_string(),
            ));
        }
        Ok(format!(
            "{}/accounts/{}/stream{}",
            self.api_base, self.account_id, path
        ))
    }

    /// Resolve a `Location` header, which may be relative to the API host
    fn resolve(&self, location: &str) -> Result<String> {
        Url::parse(&self.api_base)
            .and_then(|base| base.join(location))
            .map(|url| url.to_string())
            .map_err(|e| AppError::Backend(format!("Invalid session location {}: {}", location, e)))
    }

    // ========================================================================
    // Upload URLs
    // ========================================================================

    /// One-shot upload URL for a basic (single POST) upload
    pub async fn create_direct_upload(
        &self,
        max_duration_seconds: u32,
        name: Option<&str>,
    ) -> Result<DirectUpload> {
        let body = serde_json::json!({
            "maxDurationSeconds": max_duration_seconds,
            "requireSignedURLs": false,
            "allowedOrigins": ["*"],
            "meta": {
                "name": name,
                "uploadedVia": "ingest-server",
                "timestamp": Utc::now().to_rfc3339(),
            }
        });

        let response = self
            .http
            .post(self.endpoint("/direct_upload")?)
            .bearer_auth(&self.api_token)
            .json(&body)
            .timeout(self.timeouts.control())
            .send()
            .await?;

        let upload: DirectUpload = read_envelope(response).await?;
        tracing::info!(video_id = %upload.uid, "Issued direct upload URL");
        Ok(upload)
    }

    /// Open a resumable session on the platform and return its URL
    pub async fn create_resumable_session(
        &self,
        length: u64,
        metadata: &TusMetadata,
    ) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("")?)
            .query(&[("direct_user", "true")])
            .bearer_auth(&self.api_token)
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Length", length.to_string())
            .header("Upload-Metadata", metadata.encode())
            .timeout(self.timeouts.control())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Backend("Session created without a Location header".to_string()))?;

        let session_url = self.resolve(location)?;
        tracing::info!(session_url = %session_url, length, "Opened resumable session");
        Ok(session_url)
    }

    /// Basic URL for small files, resumable session for large ones
    pub async fn upload_url(
        &self,
        file_size: u64,
        name: Option<&str>,
        max_duration_seconds: Option<u32>,
    ) -> Result<UploadUrl> {
        if file_size == 0 {
            return Err(AppError::InvalidInput("fileSize must be positive".to_string()));
        }
        let max_duration_seconds = max_duration_seconds.unwrap_or(self.max_duration_seconds);

        let (upload_url, video_id, upload_type) = if file_size <= self.basic_upload_limit {
            let upload = self.create_direct_upload(max_duration_seconds, name).await?;
            (upload.upload_url, upload.uid, UploadType::Basic)
        } else {
            let mut metadata =
                TusMetadata::new().with("maxDurationSeconds", max_duration_seconds.to_string());
            if let Some(name) = name {
                metadata = metadata.with("name", name);
            }
            let url = self.create_resumable_session(file_size, &metadata).await?;
            let video_id = video_id_from_url(&url);
            (url, video_id, UploadType::Tus)
        };

        Ok(UploadUrl {
            upload_url,
            video_id,
            upload_type,
            max_duration_seconds,
            expires_at: Utc::now() + ChronoDuration::hours(UPLOAD_URL_LIFETIME_HOURS),
        })
    }

    // ========================================================================
    // Session Transfer
    // ========================================================================

    /// PATCH one chunk; returns the offset the platform reports afterwards
    pub async fn append_chunk(&self, session_url: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        let response = self
            .http
            .patch(session_url)
            .bearer_auth(&self.api_token)
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Offset", offset.to_string())
            .header("Content-Type", OFFSET_OCTET_STREAM)
            .body(chunk)
            .timeout(self.timeouts.transfer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        response
            .headers()
            .get("upload-offset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| AppError::Backend("Chunk accepted without an Upload-Offset header".to_string()))
    }

    /// DELETE a session; an already-gone session counts as terminated
    pub async fn terminate_session(&self, session_url: &str) -> Result<()> {
        let response = self
            .http
            .delete(session_url)
            .bearer_auth(&self.api_token)
            .header("Tus-Resumable", TUS_VERSION)
            .timeout(self.timeouts.control())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            tracing::info!(session_url = %session_url, "Terminated resumable session");
            return Ok(());
        }
        Err(error_from(response).await)
    }

    // ========================================================================
    // Video Status
    // ========================================================================

    pub async fn video_status(&self, uid: &str) -> Result<VideoStatus> {
        if uid.is_empty() || !uid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidInput(format!("Invalid video id: {}", uid)));
        }

        let response = self
            .http
            .get(self.endpoint(&format!("/{}", uid))?)
            .bearer_auth(&self.api_token)
            .timeout(self.timeouts.control())
            .send()
            .await?;

        let record: VideoRecord = read_envelope(response).await?;
        Ok(record.into())
    }
}

/// Unwrap `{success, result, errors}`, passing platform messages through verbatim
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    let envelope: ApiEnvelope<T> = response.json().await?;
    match envelope.result {
        Some(result) if envelope.success => Ok(result),
        _ => Err(AppError::Backend(envelope.error_text())),
    }
}

async fn error_from(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
        .ok()
        .filter(|envelope| !envelope.errors.is_empty())
        .map(|envelope| envelope.error_text())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        });

    if status == StatusCode::NOT_FOUND {
        AppError::NotFound(message)
    } else {
        AppError::Backend(message)
    }
}

#[async_trait::async_trait]
impl ResumableTarget for StreamClient {
    async fn create_session(&self, length: u64, metadata: &TusMetadata) -> Result<String> {
        self.create_resumable_session(length, metadata).await
    }

    async fn append(&self, session_url: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        self.append_chunk(session_url, offset, chunk).await
    }

    async fn terminate(&self, session_url: &str) -> Result<()> {
        self.terminate_session(session_url).await
    }
}

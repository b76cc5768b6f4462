//! Multipart upload lifecycle for RAW footage
//!
//! The object store is the source of truth: nothing here is persisted locally.
//! Callers carry `uploadId`, `key` and the collected part ETags between requests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use super::types::{CompletedPart, CompletedUpload, MultipartInit};
use crate::error::{AppError, Result};
use crate::format;
use crate::upload::SessionMetadata;

/// Highest part number S3 accepts
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Longest presign expiry S3 accepts (7 days)
pub const MAX_PRESIGN_SECS: u64 = 7 * 24 * 3600;

/// Download URLs handed back after completion stay valid for a day
pub const COMPLETED_URL_TTL: Duration = Duration::from_secs(24 * 3600);

/// Multipart calls against an S3-compatible object store
#[async_trait::async_trait]
pub trait MultipartBackend: Send + Sync {
    fn bucket(&self) -> &str;

    /// Open a multipart upload and return its upload id
    async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    /// Assemble the object from `parts`, returning the backend's location if any
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Option<String>>;

    /// Abort an upload; `NotFound` when the backend no longer knows it
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String>;
}

/// Object key for a new RAW upload
pub fn object_key(filename: &str) -> String {
    match format::extension(filename) {
        Some(ext) => format!("raw/{}.{}", Uuid::new_v4(), ext),
        None => format!("raw/{}.raw", Uuid::new_v4()),
    }
}

fn check_part_number(part_number: i32) -> Result<()> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "partNumber must be between 1 and {}, got {}",
            MAX_PART_NUMBER, part_number
        )))
    }
}

fn check_ttl(ttl_secs: u64) -> Result<Duration> {
    if ttl_secs == 0 || ttl_secs > MAX_PRESIGN_SECS {
        return Err(AppError::InvalidInput(format!(
            "expiresIn must be between 1 and {} seconds, got {}",
            MAX_PRESIGN_SECS, ttl_secs
        )));
    }
    Ok(Duration::from_secs(ttl_secs))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

// ============================================================================
// Multipart Manager
// ============================================================================

#[derive(Clone)]
pub struct MultipartManager {
    backend: Arc<dyn MultipartBackend>,
}

impl MultipartManager {
    pub fn new(backend: Arc<dyn MultipartBackend>) -> Self {
        Self { backend }
    }

    pub fn bucket(&self) -> &str {
        self.backend.bucket()
    }

    /// Open a multipart upload under a fresh `raw/<uuid>.<ext>` key
    pub async fn begin_upload(
        &self,
        filename: &str,
        file_size: Option<u64>,
        metadata: &SessionMetadata,
    ) -> Result<MultipartInit> {
        require("filename", filename)?;

        let key = object_key(filename);
        let content_type = metadata.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(filename)
                .first_or_octet_stream()
                .to_string()
        });

        let mut object_metadata = metadata.to_string_map();
        object_metadata.insert("original_filename".to_string(), filename.to_string());
        if let Some(size) = file_size {
            object_metadata.insert("file_size".to_string(), size.to_string());
        }

        let upload_id = self
            .backend
            .create_multipart(&key, &content_type, &object_metadata)
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            key = %key,
            content_type = %content_type,
            "Started multipart upload"
        );

        Ok(MultipartInit {
            upload_id,
            key,
            bucket: self.backend.bucket().to_string(),
        })
    }

    /// Forward one part; parts may arrive in any order
    pub async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        require("uploadId", upload_id)?;
        require("key", key)?;
        check_part_number(part_number)?;

        let size = data.len();
        let etag = self
            .backend
            .upload_part(key, upload_id, part_number, data)
            .await?;

        tracing::debug!(
            upload_id = %upload_id,
            part_number,
            size,
            "Uploaded part"
        );

        Ok(etag)
    }

    /// Presigned URL for the client to PUT one part directly
    pub async fn presign_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: i32,
        ttl_secs: u64,
    ) -> Result<String> {
        require("uploadId", upload_id)?;
        require("key", key)?;
        check_part_number(part_number)?;
        let ttl = check_ttl(ttl_secs)?;

        self.backend
            .presign_upload_part(key, upload_id, part_number, ttl)
            .await
    }

    /// Assemble the object and return a day-long download URL
    pub async fn complete_upload(
        &self,
        upload_id: &str,
        key: &str,
        mut parts: Vec<CompletedPart>,
    ) -> Result<CompletedUpload> {
        require("uploadId", upload_id)?;
        require("key", key)?;
        if parts.is_empty() {
            return Err(AppError::InvalidInput("parts must not be empty".to_string()));
        }
        for part in &parts {
            check_part_number(part.part_number)?;
        }
        parts.sort_by_key(|p| p.part_number);

        let location = match self.backend.complete_multipart(key, upload_id, &parts).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(upload_id = %upload_id, key = %key, error = %e, "Completion rejected");
                return Err(e);
            }
        };

        let url = self.backend.presign_get(key, COMPLETED_URL_TTL).await?;

        tracing::info!(
            upload_id = %upload_id,
            key = %key,
            parts = parts.len(),
            "Completed multipart upload"
        );

        Ok(CompletedUpload { url, key: key.to_string(), location })
    }

    /// Abort an upload; aborting one the backend has already dropped succeeds
    pub async fn abort_upload(&self, upload_id: &str, key: &str) -> Result<()> {
        require("uploadId", upload_id)?;
        require("key", key)?;

        match self.backend.abort_multipart(key, upload_id).await {
            Ok(()) => {
                tracing::info!(upload_id = %upload_id, key = %key, "Aborted multipart upload");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(upload_id = %upload_id, "Abort of unknown upload");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn presign_download(&self, key: &str, ttl_secs: u64) -> Result<String> {
        require("key", key)?;
        let ttl = check_ttl(ttl_secs)?;
        self.backend.presign_get(key, ttl).await
    }
}

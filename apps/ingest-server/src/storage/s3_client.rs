//! S3-compatible storage client
//!
//! Wraps the AWS SDK for the multipart calls used by the RAW upload path.
//! Works against Cloudflare R2, MinIO and AWS S3.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart},
    Client,
};
use bytes::Bytes;

use crate::config::{StorageConfig, TimeoutConfig};
use crate::error::{AppError, Result};

use super::multipart::MultipartBackend;
use super::types::CompletedPart;

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    timeouts: TimeoutConfig,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub fn new(config: &StorageConfig, timeouts: TimeoutConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "ingest-server",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "auto".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            timeouts,
        }
    }

    /// Check the bucket is reachable; failures are logged, not fatal
    pub async fn verify_bucket(&self) {
        let check = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(self.timeouts.control(), check).await {
            Ok(Ok(_)) => {
                tracing::info!("Connected to S3 bucket: {}", self.bucket);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    self.bucket,
                    DisplayErrorContext(&e)
                );
            }
            Err(_) => {
                tracing::warn!(
                    "Timed out verifying bucket {}. Will attempt operations anyway.",
                    self.bucket
                );
            }
        }
    }

    fn presigning(ttl: Duration) -> Result<PresigningConfig> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::InvalidInput(format!("Invalid presign expiry: {}", e)))
    }
}

/// Bound an SDK call by `limit`
async fn timed<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        AppError::Timeout(format!("{} after {}s", operation, limit.as_secs()))
    })?
}

/// Map an SDK failure onto the error taxonomy, keeping the backend's message
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    match &err {
        SdkError::TimeoutError(_) => AppError::Timeout(operation.to_string()),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => AppError::Network(format!(
            "{}: {}",
            operation,
            DisplayErrorContext(&err)
        )),
        _ => {
            let message = err
                .message()
                .or_else(|| err.code())
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            AppError::Backend(message)
        }
    }
}

#[async_trait::async_trait]
impl MultipartBackend for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String> {
        let user_metadata: HashMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(user_metadata));

        let output = timed(self.timeouts.control(), "create multipart upload", async {
            request
                .send()
                .await
                .map_err(|e| sdk_error("create multipart upload", e))
        })
        .await?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| AppError::Backend("S3 did not return an upload id".to_string()))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(data.len() as i64)
            .body(ByteStream::from(data));

        let output = timed(self.timeouts.transfer(), "upload part", async {
            request.send().await.map_err(|e| sdk_error("upload part", e))
        })
        .await?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| AppError::Backend(format!("S3 returned no ETag for part {}", part_number)))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Option<String>> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        S3CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let request = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed);

        let output = timed(self.timeouts.control(), "complete multipart upload", async {
            request
                .send()
                .await
                .map_err(|e| sdk_error("complete multipart upload", e))
        })
        .await?;

        Ok(output.location().map(str::to_string))
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id);

        timed(self.timeouts.control(), "abort multipart upload", async {
            match request.send().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    let missing = e.code() == Some("NoSuchUpload")
                        || e.raw_response().map(|r| r.status().as_u16()) == Some(404);
                    if missing {
                        Err(AppError::NotFound(format!("Multipart upload {}", upload_id)))
                    } else {
                        Err(sdk_error("abort multipart upload", e))
                    }
                }
            }
        })
        .await
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| sdk_error("presign download", e))?;

        Ok(presigned.uri().to_string())
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String> {
        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| sdk_error("presign part upload", e))?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_client() -> S3Client {
        let config = Config::default();
        S3Client::new(&config.storage, config.timeouts)
    }

    #[tokio::test]
    async fn test_presign_download_is_local() {
        // Presigning signs locally and needs no network
        let client = test_client();
        let url = client
            .presign_get("raw/abc.braw", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/color-studio-raw/raw/abc.braw?"));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_presign_part_carries_upload_id() {
        let client = test_client();
        let url = client
            .presign_upload_part("raw/abc.braw", "upload-1", 3, Duration::from_secs(600))
            .await
            .unwrap();

        assert!(url.contains("partNumber=3"));
        assert!(url.contains("uploadId=upload-1"));
    }

    #[tokio::test]
    async fn test_presign_rejects_excessive_expiry() {
        let client = test_client();
        let result = client
            .presign_get("raw/abc.braw", Duration::from_secs(8 * 24 * 3600))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_timed_reports_timeout() {
        let result: Result<()> = timed(Duration::from_millis(10), "slow call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}

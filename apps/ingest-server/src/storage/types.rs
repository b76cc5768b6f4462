//! Storage types

use serde::{Deserialize, Serialize};

/// A part the caller has uploaded, as submitted for completion
///
/// Accepts both camelCase and the S3-style `PartNumber`/`ETag` spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    #[serde(alias = "PartNumber", alias = "part_number")]
    pub part_number: i32,

    #[serde(alias = "ETag", alias = "eTag")]
    pub etag: String,
}

/// Result of starting a multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInit {
    pub upload_id: String,
    pub key: String,
    pub bucket: String,
}

/// Result of a completed multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    /// Time-limited download URL
    pub url: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A presigned request URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub expires_in: u64,
}

//! Resumable upload (TUS 1.0.0) header conventions
//!
//! Shared by the local chunk endpoints, which speak a subset of the protocol
//! to browsers, and the relay path, which speaks it to the media platform.

use axum::http::{HeaderMap, HeaderName};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AppError, Result};

pub const TUS_VERSION: &str = "1.0.0";

pub const TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub const UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");

/// Content type required on PATCH requests
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Read a non-negative integer header such as `Upload-Offset`
pub fn parse_u64_header(headers: &HeaderMap, name: &HeaderName) -> Result<Option<u64>> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| AppError::InvalidInput(format!("{} must be a non-negative integer", name)))
}

/// `Upload-Metadata` value: comma-separated `key base64(value)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TusMetadata {
    pairs: Vec<(String, String)>,
}

impl TusMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode for the `Upload-Metadata` header
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{} {}", k, STANDARD.encode(v.as_bytes())))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse an `Upload-Metadata` header. Keys without a value decode to "".
    pub fn decode(header: &str) -> Result<Self> {
        let mut pairs = Vec::new();

        for entry in header.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(2, ' ');
            let key = parts.next().unwrap_or_default().to_string();
            let value = match parts.next() {
                Some(encoded) => {
                    let raw = STANDARD.decode(encoded.trim()).map_err(|e| {
                        AppError::InvalidInput(format!("Upload-Metadata value for {}: {}", key, e))
                    })?;
                    String::from_utf8(raw).map_err(|_| {
                        AppError::InvalidInput(format!("Upload-Metadata value for {} is not UTF-8", key))
                    })?
                }
                None => String::new(),
            };
            pairs.push((key, value));
        }

        Ok(Self { pairs })
    }
}

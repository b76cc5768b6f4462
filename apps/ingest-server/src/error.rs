//! Error types for the Ingest server

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::tus;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported media format: {0}")]
    InvalidFormat(String),

    #[error("Offset mismatch: expected {expected}, received {received}")]
    OffsetMismatch { expected: u64, received: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload not ready: {0}")]
    NotReady(String),

    /// Remote backend rejected the call; the message is the backend's own text.
    #[error("{0}")]
    Backend(String),

    #[error("Integrity check failed: declared {declared} bytes, relayed {relayed}")]
    Integrity { declared: u64, relayed: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error class
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidFormat(_) | Self::OffsetMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotReady(_) => StatusCode::CONFLICT,
            Self::Backend(_) | Self::Integrity { .. } | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidFormat(_) => "invalid_format",
            Self::OffsetMismatch { .. } => "offset_mismatch",
            Self::NotFound(_) => "not_found",
            Self::NotReady(_) => "not_ready",
            Self::Backend(_) => "backend_error",
            Self::Integrity { .. } => "integrity_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller may safely retry the whole operation
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            AppError::Network(e.to_string())
        } else {
            AppError::Backend(e.to_string())
        }
    }
}

/// Error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_offset: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "IO error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            AppError::Backend(msg) => {
                tracing::error!("Backend error: {}", msg);
                msg.clone()
            }
            other => other.to_string(),
        };

        let expected_offset = match &self {
            AppError::OffsetMismatch { expected, .. } => Some(*expected),
            _ => None,
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.code(),
            message,
            expected_offset,
            retryable: self.is_transient(),
        });

        let mut response = (status, body).into_response();
        if let Some(offset) = expected_offset {
            let headers = response.headers_mut();
            headers.insert(tus::UPLOAD_OFFSET, HeaderValue::from(offset));
            headers.insert(tus::TUS_RESUMABLE, HeaderValue::from_static(tus::TUS_VERSION));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::OffsetMismatch { expected: 5, received: 0 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotReady("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Network("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Integrity { declared: 2, relayed: 1 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = AppError::Backend("InvalidPart: One or more of the specified parts could not be found".into());
        assert_eq!(
            err.to_string(),
            "InvalidPart: One or more of the specified parts could not be found"
        );
    }

    #[test]
    fn test_offset_mismatch_response_carries_offset() {
        let response = AppError::OffsetMismatch { expected: 42, received: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(tus::UPLOAD_OFFSET).unwrap(), "42");
    }

    #[test]
    fn test_transient_classes() {
        assert!(AppError::Timeout("create multipart upload".into()).is_transient());
        assert!(!AppError::Backend("denied".into()).is_transient());
    }

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_transient_errors_are_marked_retryable() {
        let body = body_json(AppError::Timeout("upload part after 300s".into())).await;
        assert_eq!(body["retryable"], true);
        assert_eq!(body["error"], "timeout");

        let body = body_json(AppError::Backend("denied".into())).await;
        assert!(body.get("retryable").is_none());
    }
}

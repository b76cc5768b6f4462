//! Media platform types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard response envelope of the platform API
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    /// Joined error messages, used verbatim as the backend diagnostic
    pub fn error_text(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One-shot upload URL issued by the platform
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpload {
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
    pub uid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    /// Single POST of the whole file
    Basic,
    /// Resumable session
    Tus,
}

/// Where the client should send its bytes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrl {
    pub upload_url: String,
    pub video_id: String,
    pub upload_type: UploadType,
    pub max_duration_seconds: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
}

/// Processing state of an uploaded video
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub uid: String,
    pub state: String,
    pub ready_to_stream: bool,
    pub duration: Option<f64>,
    pub size: Option<u64>,
    pub playback: Playback,
    pub name: Option<String>,
}

/// Video record as the platform returns it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoRecord {
    pub uid: String,
    #[serde(default)]
    pub status: Option<VideoState>,
    #[serde(default)]
    pub ready_to_stream: bool,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub playback: Option<Playback>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoState {
    #[serde(default)]
    pub state: String,
}

impl From<VideoRecord> for VideoStatus {
    fn from(record: VideoRecord) -> Self {
        let name = record
            .meta
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string);

        VideoStatus {
            uid: record.uid,
            state: record
                .status
                .map(|s| s.state)
                .unwrap_or_else(|| "unknown".to_string()),
            ready_to_stream: record.ready_to_stream,
            // The platform reports -1 until the duration is known
            duration: record.duration.filter(|d| *d >= 0.0),
            size: record.size,
            playback: record.playback.unwrap_or_default(),
            name,
        }
    }
}

/// Result of relaying one request body into a resumable session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOutcome {
    pub video_id: String,
    pub session_url: String,
    pub bytes_relayed: u64,
    pub chunks: u32,
}

//! Upload types for the resumable chunked path

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{AppError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Chunk size used by browser clients and by the relay: 5MB
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Session ids are this many hex characters
pub const SESSION_ID_LEN: usize = 16;

// ============================================================================
// Session Types
// ============================================================================

/// Session status
///
/// Advances `Created -> InProgress -> Completed -> Finalized`. `Failed` and
/// `Aborted` can be entered from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// File allocated, no bytes yet
    Created,
    /// Receiving chunks
    InProgress,
    /// All bytes received, waiting for finalization
    Completed,
    /// File moved to its permanent location
    Finalized,
    /// Backing file lost or unusable
    Failed,
    /// Cancelled by the client
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed | Self::Aborted)
    }

    /// Whether the session may still accept chunk writes
    pub fn accepts_chunks(self) -> bool {
        matches!(self, Self::Created | Self::InProgress)
    }

    pub fn can_advance_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            Failed | Aborted => true,
            Created => false,
            InProgress => matches!(self, Created | InProgress),
            Completed => matches!(self, Created | InProgress),
            Finalized => self == Completed,
        }
    }
}

/// Metadata supplied by the client at creation time
///
/// Fields the service relies on are typed; everything else is kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SessionMetadata {
    /// Flatten to string pairs, e.g. for object-store user metadata
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        if let Some(email) = &self.client_email {
            map.insert("client_email".to_string(), email.clone());
        }
        if let Some(project) = &self.project_name {
            map.insert("project_name".to_string(), project.clone());
        }
        if let Some(content_type) = &self.content_type {
            map.insert("content_type".to_string(), content_type.clone());
        }
        for (key, value) in &self.extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            map.insert(key.clone(), value);
        }

        map
    }
}

/// Upload session state, persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Opaque session id
    pub id: String,

    /// Original file name
    pub filename: String,

    /// Declared size in bytes
    pub total_size: u64,

    /// Bytes written so far; never exceeds `total_size`
    pub bytes_received: u64,

    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,

    pub last_modified_at: DateTime<Utc>,

    /// Where the file was moved on finalize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_path: Option<PathBuf>,

    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl UploadSession {
    /// Create a new session record with nothing received
    pub fn new(filename: &str, total_size: u64, metadata: SessionMetadata) -> Self {
        let now = Utc::now();

        Self {
            id: generate_session_id(filename, total_size, now),
            filename: filename.to_string(),
            total_size,
            bytes_received: 0,
            status: SessionStatus::Created,
            created_at: now,
            last_modified_at: now,
            final_path: None,
            metadata,
        }
    }

    /// Check if all bytes have been received
    pub fn is_complete(&self) -> bool {
        self.bytes_received >= self.total_size
    }

    /// Calculate progress percentage
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        (self.bytes_received as f64 / self.total_size as f64) * 100.0
    }

    /// Move to `next`, refusing backwards or out-of-terminal transitions
    pub fn advance(&mut self, next: SessionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_advance_to(next) {
            return Err(AppError::InvalidInput(format!(
                "Session {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.last_modified_at = Utc::now();
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            upload_id: self.id.clone(),
            filename: self.filename.clone(),
            file_size: self.total_size,
            bytes_uploaded: self.bytes_received,
            progress: self.progress(),
            status: self.status,
            created_at: self.created_at,
            last_modified: self.last_modified_at,
            final_path: self.final_path.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Derive a session id from filename, size and creation time
pub fn generate_session_id(filename: &str, total_size: u64, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}_{}_{}",
        filename,
        total_size,
        at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    ));
    let mut id = hex::encode(hasher.finalize());
    id.truncate(SESSION_ID_LEN);
    id
}

/// Whether `id` has the shape of a generated session id
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

// ============================================================================
// Response Types
// ============================================================================

/// Result of a successful chunk write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub upload_id: String,
    pub bytes_uploaded: u64,
    pub file_size: u64,
    pub progress: f64,
    pub status: SessionStatus,
}

/// Client-facing view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub upload_id: String,
    pub filename: String,
    pub file_size: u64,
    pub bytes_uploaded: u64,
    pub progress: f64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_path: Option<PathBuf>,
    pub metadata: SessionMetadata,
}

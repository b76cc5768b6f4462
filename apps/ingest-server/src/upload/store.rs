//! Session Store
//!
//! Durable state for chunked uploads: one JSON record and one preallocated
//! data file per session, both keyed by session id.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::types::{is_valid_session_id, UploadSession};
use crate::error::{AppError, Result};

// ============================================================================
// Session Store Trait
// ============================================================================

/// Persistence backend for upload sessions
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the backing file for a session, sized to `size` bytes
    async fn allocate(&self, id: &str, size: u64) -> Result<()>;

    /// Write `data` at byte `offset` of the backing file
    async fn write_at(&self, id: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Move the backing file to `destination`
    async fn move_data(&self, id: &str, destination: &Path) -> Result<()>;

    /// Move a file previously taken by `move_data` back into place
    async fn restore_data(&self, id: &str, source: &Path) -> Result<()>;

    /// Remove the backing file. Returns false if it did not exist.
    async fn remove_data(&self, id: &str) -> Result<bool>;

    /// Persist a session record
    async fn save(&self, session: &UploadSession) -> Result<()>;

    /// Load a session record
    async fn load(&self, id: &str) -> Result<Option<UploadSession>>;

    /// Delete a session record. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// All readable session records
    async fn list(&self) -> Result<Vec<UploadSession>>;
}

// ============================================================================
// Local Filesystem Store
// ============================================================================

/// Filesystem session store: `<dir>/<id>.json` next to `<dir>/<id>.part`
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    base_path: PathBuf,
}

impl FsSessionStore {
    /// Open a store rooted at `base_path`, creating the directory if needed
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of a session's backing file
    pub fn data_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.part", id))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn checked_id<'a>(&self, id: &'a str) -> Result<&'a str> {
        if is_valid_session_id(id) {
            Ok(id)
        } else {
            Err(AppError::NotFound(format!("Upload session {}", id)))
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for FsSessionStore {
    async fn allocate(&self, id: &str, size: u64) -> Result<()> {
        let path = self.data_path(self.checked_id(id)?);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        if let Err(e) = file.set_len(size).await {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn write_at(&self, id: &str, offset: u64, data: &[u8]) -> Result<()> {
        let path = self.data_path(self.checked_id(id)?);

        // The handle is dropped (and closed) on every return path
        let mut file = OpenOptions::new().write(true).open(&path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_data().await?;

        Ok(())
    }

    async fn move_data(&self, id: &str, destination: &Path) -> Result<()> {
        let source = self.data_path(self.checked_id(id)?);
        move_file(id, &source, destination).await
    }

    async fn restore_data(&self, id: &str, source: &Path) -> Result<()> {
        let destination = self.data_path(self.checked_id(id)?);
        move_file(id, source, &destination).await
    }

    async fn remove_data(&self, id: &str) -> Result<bool> {
        let path = self.data_path(self.checked_id(id)?);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &UploadSession) -> Result<()> {
        let path = self.record_path(self.checked_id(&session.id)?);
        let staging = self.base_path.join(format!("{}.json.saving", session.id));

        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| AppError::Internal(format!("Failed to encode session: {}", e)))?;

        // Write-then-rename so a crash never leaves a torn record
        fs::write(&staging, json).await?;
        fs::rename(&staging, &path).await?;

        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<UploadSession>> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }

        let raw = match fs::read(self.record_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("Corrupt session record {}: {}", id, e)))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.record_path(self.checked_id(id)?);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };

            match self.load(id).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Skipping unreadable session record");
                }
            }
        }

        Ok(sessions)
    }
}

/// Rename `source` to `destination`, copying when they sit on different filesystems
async fn move_file(id: &str, source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(e.into()),
        Err(e) => {
            tracing::debug!(
                session_id = %id,
                error = %e,
                "Rename failed, copying backing file instead"
            );
            if let Err(copy_err) = fs::copy(source, destination).await {
                let _ = fs::remove_file(destination).await;
                return Err(copy_err.into());
            }
            fs::remove_file(source).await?;
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

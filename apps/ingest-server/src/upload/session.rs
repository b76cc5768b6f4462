//! Upload Session Manager
//!
//! Manages chunked upload sessions with:
//! - Strict sequential offsets (one gapless, non-overlapping byte stream)
//! - A per-session lock so a single writer mutates a session at a time
//! - Age-based sweeping of abandoned sessions

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::store::SessionStore;
use super::types::{ChunkProgress, SessionMetadata, SessionStatus, UploadSession};
use crate::error::{AppError, Result};

/// Upper bound on the reap age, one year
pub const MAX_REAP_AGE_HOURS: i64 = 24 * 365;

type LockMap = parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Exclusive access to one session
///
/// The map entry is removed once the last holder or waiter lets go.
struct SessionGuard {
    id: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts
        self.guard.take();
        let mut locks = self.locks.lock();
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Manages upload sessions
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    store: Arc<dyn SessionStore>,

    /// One lock per session id with a holder or waiter
    locks: Arc<LockMap>,

    /// Largest accepted declared size
    max_upload_size: u64,
}

impl SessionManager {
    /// Create a new session manager over `store`
    pub fn new(store: Arc<dyn SessionStore>, max_upload_size: u64) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                store,
                locks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
                max_upload_size,
            }),
        }
    }

    async fn lock(&self, id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.inner.locks.lock();
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        // Built before waiting so a cancelled waiter still cleans up its entry
        let mut entry = SessionGuard {
            id: id.to_string(),
            locks: self.inner.locks.clone(),
            guard: None,
        };
        entry.guard = Some(lock.lock_owned().await);
        entry
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.inner.locks.lock().len()
    }

    async fn load(&self, id: &str) -> Result<UploadSession> {
        self.inner
            .store
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload session {}", id)))
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Create a new upload session and preallocate its backing file
    pub async fn create_session(
        &self,
        filename: &str,
        total_size: i64,
        metadata: SessionMetadata,
    ) -> Result<UploadSession> {
        if filename.trim().is_empty() {
            return Err(AppError::InvalidInput("filename is required".to_string()));
        }
        if total_size <= 0 {
            return Err(AppError::InvalidInput(format!(
                "fileSize must be positive, got {}",
                total_size
            )));
        }
        let total_size = total_size as u64;
        if total_size > self.inner.max_upload_size {
            return Err(AppError::InvalidInput(format!(
                "fileSize {} exceeds the maximum of {} bytes",
                total_size, self.inner.max_upload_size
            )));
        }

        let session = UploadSession::new(filename, total_size, metadata);
        let _guard = self.lock(&session.id).await;

        // Allocate first so a full disk is reported now rather than mid-transfer
        self.inner.store.allocate(&session.id, total_size).await?;

        if let Err(e) = self.inner.store.save(&session).await {
            let _ = self.inner.store.remove_data(&session.id).await;
            return Err(e);
        }

        tracing::info!(
            session_id = %session.id,
            filename = %session.filename,
            file_size = total_size,
            "Created upload session"
        );

        Ok(session)
    }

    /// Get a session by ID
    pub async fn status(&self, id: &str) -> Result<UploadSession> {
        self.load(id).await
    }

    /// Write one chunk at `offset`, which must equal the bytes received so far
    pub async fn write_chunk(&self, id: &str, offset: u64, data: &[u8]) -> Result<ChunkProgress> {
        let _guard = self.lock(id).await;
        let mut session = self.load(id).await?;

        if !session.status.accepts_chunks() {
            return Err(AppError::InvalidInput(format!(
                "Session {} is {:?} and accepts no more data",
                id, session.status
            )));
        }

        if offset != session.bytes_received {
            tracing::debug!(
                session_id = %id,
                expected = session.bytes_received,
                received = offset,
                "Chunk offset mismatch"
            );
            return Err(AppError::OffsetMismatch {
                expected: session.bytes_received,
                received: offset,
            });
        }

        if data.is_empty() {
            return Err(AppError::InvalidInput("chunk body is empty".to_string()));
        }

        let remaining = session.total_size - session.bytes_received;
        if data.len() as u64 > remaining {
            return Err(AppError::InvalidInput(format!(
                "chunk of {} bytes overruns the declared size ({} bytes remaining)",
                data.len(),
                remaining
            )));
        }

        match self.inner.store.write_at(id, offset, data).await {
            Ok(()) => {}
            Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                // The backing file is gone; nothing can resume this session
                session.advance(SessionStatus::Failed)?;
                self.inner.store.save(&session).await?;
                tracing::warn!(session_id = %id, "Backing file missing, session failed");
                return Err(AppError::Internal(format!(
                    "Backing file for session {} is missing",
                    id
                )));
            }
            Err(e) => return Err(e),
        }

        session.bytes_received = offset + data.len() as u64;
        if session.is_complete() {
            session.advance(SessionStatus::Completed)?;
        } else {
            session.advance(SessionStatus::InProgress)?;
        }
        session.last_modified_at = Utc::now();
        self.inner.store.save(&session).await?;

        tracing::debug!(
            session_id = %id,
            bytes_received = session.bytes_received,
            total_size = session.total_size,
            progress = format!("{:.1}%", session.progress()),
            "Chunk written"
        );

        if session.status == SessionStatus::Completed {
            tracing::info!(
                session_id = %id,
                filename = %session.filename,
                "Upload session completed"
            );
        }

        Ok(ChunkProgress {
            upload_id: session.id.clone(),
            bytes_uploaded: session.bytes_received,
            file_size: session.total_size,
            progress: session.progress(),
            status: session.status,
        })
    }

    /// Move a completed upload to `destination`
    pub async fn finalize(&self, id: &str, destination: &Path) -> Result<UploadSession> {
        let _guard = self.lock(id).await;
        let mut session = self.load(id).await?;

        if session.status != SessionStatus::Completed {
            return Err(AppError::NotReady(format!(
                "Session {} is {:?}, {} of {} bytes received",
                id, session.status, session.bytes_received, session.total_size
            )));
        }

        self.inner.store.move_data(id, destination).await?;

        session.advance(SessionStatus::Finalized)?;
        session.final_path = Some(destination.to_path_buf());
        if let Err(e) = self.inner.store.save(&session).await {
            // Put the data back so the record's `completed` still holds
            if let Err(restore_err) = self.inner.store.restore_data(id, destination).await {
                tracing::error!(
                    session_id = %id,
                    final_path = %destination.display(),
                    error = %restore_err,
                    "Could not restore backing file after a failed finalize"
                );
            }
            return Err(e);
        }

        tracing::info!(
            session_id = %id,
            final_path = %destination.display(),
            file_size = session.total_size,
            "Upload session finalized"
        );

        Ok(session)
    }

    /// Cancel a session and release its backing file
    pub async fn abort(&self, id: &str) -> Result<UploadSession> {
        let _guard = self.lock(id).await;
        let mut session = self.load(id).await?;

        if session.status == SessionStatus::Aborted {
            return Ok(session);
        }

        session.advance(SessionStatus::Aborted)?;
        self.inner.store.remove_data(id).await?;
        self.inner.store.save(&session).await?;

        tracing::info!(
            session_id = %id,
            filename = %session.filename,
            "Upload session aborted"
        );

        Ok(session)
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Delete non-finalized sessions untouched for more than `max_age_hours`
    ///
    /// Returns the number of sessions removed
    pub async fn reap(&self, max_age_hours: i64) -> Result<usize> {
        if !(1..=MAX_REAP_AGE_HOURS).contains(&max_age_hours) {
            return Err(AppError::InvalidInput(format!(
                "reap age must be between 1 and {} hours, got {}",
                MAX_REAP_AGE_HOURS, max_age_hours
            )));
        }
        self.reap_before(Utc::now() - Duration::hours(max_age_hours)).await
    }

    /// Delete non-finalized sessions last modified before `cutoff`
    pub async fn reap_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let candidates: Vec<String> = self
            .inner
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| is_reapable(s, cutoff))
            .map(|s| s.id)
            .collect();

        let mut count = 0;
        for id in candidates {
            let guard = self.lock(&id).await;

            // Re-check under the lock; a writer may have touched it meanwhile
            let still_stale = matches!(
                self.inner.store.load(&id).await,
                Ok(Some(ref s)) if is_reapable(s, cutoff)
            );
            if !still_stale {
                continue;
            }

            // Record last, so a failed sweep is retried on the next pass
            if let Err(e) = self.inner.store.remove_data(&id).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to remove backing file");
                continue;
            }
            if let Err(e) = self.inner.store.delete(&id).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to remove session record");
                continue;
            }

            drop(guard);
            count += 1;

            tracing::debug!(session_id = %id, "Reaped expired upload session");
        }

        if count > 0 {
            tracing::info!(count = count, "Reaped expired upload sessions");
        }

        Ok(count)
    }
}

fn is_reapable(session: &UploadSession, cutoff: DateTime<Utc>) -> bool {
    session.status != SessionStatus::Finalized && session.last_modified_at < cutoff
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::store::FsSessionStore;
    use tempfile::TempDir;

    const MIB: usize = 1024 * 1024;

    async fn create_test_manager() -> (SessionManager, FsSessionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSessionStore::open(temp_dir.path().join("temp")).await.unwrap();
        let manager = SessionManager::new(Arc::new(store.clone()), u64::MAX);
        (manager, store, temp_dir)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_create_session() {
        let (manager, store, _dir) = create_test_manager().await;

        let session = manager
            .create_session("clip.mov", 1024, SessionMetadata::default())
            .await
            .unwrap();

        assert_eq!(session.filename, "clip.mov");
        assert_eq!(session.total_size, 1024);
        assert_eq!(session.bytes_received, 0);
        assert_eq!(session.status, SessionStatus::Created);
        assert_eq!(std::fs::metadata(store.data_path(&session.id)).unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_size() {
        let (manager, _store, _dir) = create_test_manager().await;

        for size in [0, -1, i64::MIN] {
            let result = manager
                .create_session("clip.mov", size, SessionMetadata::default())
                .await;
            assert!(matches!(result, Err(AppError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_create_rejects_oversized() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSessionStore::open(temp_dir.path()).await.unwrap();
        let manager = SessionManager::new(Arc::new(store), 1000);

        let result = manager
            .create_session("clip.mov", 1001, SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_two_chunk_scenario() {
        let (manager, store, dir) = create_test_manager().await;

        let session = manager
            .create_session("clip.mov", 10 * MIB as i64, SessionMetadata::default())
            .await
            .unwrap();

        let first = manager
            .write_chunk(&session.id, 0, &vec![1u8; 5 * MIB])
            .await
            .unwrap();
        assert_eq!(first.progress, 50.0);
        assert_eq!(first.status, SessionStatus::InProgress);

        let second = manager
            .write_chunk(&session.id, 5 * MIB as u64, &vec![2u8; 5 * MIB])
            .await
            .unwrap();
        assert_eq!(second.progress, 100.0);
        assert_eq!(second.status, SessionStatus::Completed);

        let destination = dir.path().join("perm").join("clip.mov");
        let finalized = manager.finalize(&session.id, &destination).await.unwrap();

        assert_eq!(finalized.status, SessionStatus::Finalized);
        assert_eq!(finalized.final_path.as_deref(), Some(destination.as_path()));
        assert!(destination.exists());
        assert!(!store.data_path(&session.id).exists());

        let data = std::fs::read(&destination).unwrap();
        assert_eq!(data.len(), 10 * MIB);
        assert_eq!(data[0], 1);
        assert_eq!(data[10 * MIB - 1], 2);
    }

    #[tokio::test]
    async fn test_any_partition_completes_exactly_once() {
        let (manager, store, _dir) = create_test_manager().await;
        let payload = pattern(1000);

        let partitions: Vec<Vec<usize>> = vec![
            vec![1000],
            vec![1; 1000],
            vec![1, 998, 1],
            vec![333, 333, 333, 1],
            vec![7, 100, 450, 43, 400],
        ];

        for sizes in partitions {
            let session = manager
                .create_session("clip.mp4", 1000, SessionMetadata::default())
                .await
                .unwrap();

            let mut offset = 0usize;
            let mut completions = 0;
            for size in &sizes {
                let result = manager
                    .write_chunk(&session.id, offset as u64, &payload[offset..offset + size])
                    .await
                    .unwrap();
                offset += size;

                assert!(result.bytes_uploaded <= 1000);
                assert_eq!(result.bytes_uploaded, offset as u64);
                if result.status == SessionStatus::Completed {
                    completions += 1;
                }
            }

            assert_eq!(completions, 1, "partition {:?}", sizes);
            let written = std::fs::read(store.data_path(&session.id)).unwrap();
            assert_eq!(written, payload);
        }
    }

    #[tokio::test]
    async fn test_offset_mismatch_leaves_state_unchanged() {
        let (manager, store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 10, SessionMetadata::default())
            .await
            .unwrap();

        manager.write_chunk(&session.id, 0, b"abcd").await.unwrap();
        let before = manager.status(&session.id).await.unwrap();
        let file_before = std::fs::read(store.data_path(&session.id)).unwrap();

        for bad_offset in [0u64, 3, 5, 10] {
            let result = manager.write_chunk(&session.id, bad_offset, b"zz").await;
            match result {
                Err(AppError::OffsetMismatch { expected, received }) => {
                    assert_eq!(expected, 4);
                    assert_eq!(received, bad_offset);
                }
                other => panic!("expected OffsetMismatch, got {:?}", other),
            }
        }

        assert_eq!(manager.status(&session.id).await.unwrap(), before);
        assert_eq!(std::fs::read(store.data_path(&session.id)).unwrap(), file_before);
    }

    #[tokio::test]
    async fn test_overrun_and_empty_chunks_rejected() {
        let (manager, _store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 4, SessionMetadata::default())
            .await
            .unwrap();

        let overrun = manager.write_chunk(&session.id, 0, b"abcde").await;
        assert!(matches!(overrun, Err(AppError::InvalidInput(_))));

        let empty = manager.write_chunk(&session.id, 0, b"").await;
        assert!(matches!(empty, Err(AppError::InvalidInput(_))));

        assert_eq!(manager.status(&session.id).await.unwrap().bytes_received, 0);
    }

    #[tokio::test]
    async fn test_completed_session_rejects_more_data() {
        let (manager, _store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 2, SessionMetadata::default())
            .await
            .unwrap();

        manager.write_chunk(&session.id, 0, b"ok").await.unwrap();
        let result = manager.write_chunk(&session.id, 2, b"x").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_finalize_not_ready_has_no_side_effects() {
        let (manager, store, dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 10, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&session.id, 0, b"half!").await.unwrap();

        let destination = dir.path().join("perm").join("clip.mov");
        let result = manager.finalize(&session.id, &destination).await;

        assert!(matches!(result, Err(AppError::NotReady(_))));
        assert!(!destination.exists());
        assert!(!dir.path().join("perm").exists());
        assert!(store.data_path(&session.id).exists());
        assert_eq!(
            manager.status(&session.id).await.unwrap().status,
            SessionStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (manager, _store, _dir) = create_test_manager().await;

        assert!(matches!(
            manager.status("0123456789abcdef").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            manager.write_chunk("nope", 0, b"x").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_backing_file_fails_session() {
        let (manager, store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 10, SessionMetadata::default())
            .await
            .unwrap();

        std::fs::remove_file(store.data_path(&session.id)).unwrap();

        assert!(manager.write_chunk(&session.id, 0, b"abc").await.is_err());
        let failed = manager.status(&session.id).await.unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.bytes_received, 0);
    }

    #[tokio::test]
    async fn test_abort_releases_file() {
        let (manager, store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 10, SessionMetadata::default())
            .await
            .unwrap();

        let aborted = manager.abort(&session.id).await.unwrap();
        assert_eq!(aborted.status, SessionStatus::Aborted);
        assert!(!store.data_path(&session.id).exists());

        // Idempotent, and no further writes
        assert!(manager.abort(&session.id).await.is_ok());
        assert!(manager.write_chunk(&session.id, 0, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_reap_scenario() {
        let (manager, store, dir) = create_test_manager().await;
        let stale_time = Utc::now() - Duration::hours(25);

        // In-progress session last touched 25h ago
        let stale = manager
            .create_session("stale.mov", 10, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&stale.id, 0, b"abc").await.unwrap();
        let mut record = store.load(&stale.id).await.unwrap().unwrap();
        record.last_modified_at = stale_time;
        store.save(&record).await.unwrap();

        // Finalized session, equally old
        let done = manager
            .create_session("done.mov", 3, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&done.id, 0, b"abc").await.unwrap();
        manager
            .finalize(&done.id, &dir.path().join("perm").join("done.mov"))
            .await
            .unwrap();
        let mut record = store.load(&done.id).await.unwrap().unwrap();
        record.last_modified_at = stale_time - Duration::days(30);
        store.save(&record).await.unwrap();

        // Fresh session
        let fresh = manager
            .create_session("fresh.mov", 10, SessionMetadata::default())
            .await
            .unwrap();

        let reaped = manager.reap(24).await.unwrap();
        assert_eq!(reaped, 1);

        assert!(matches!(manager.status(&stale.id).await, Err(AppError::NotFound(_))));
        assert!(!store.data_path(&stale.id).exists());

        assert_eq!(
            manager.status(&done.id).await.unwrap().status,
            SessionStatus::Finalized
        );
        assert_eq!(
            manager.status(&fresh.id).await.unwrap().status,
            SessionStatus::Created
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_serialized() {
        let (manager, _store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 8, SessionMetadata::default())
            .await
            .unwrap();

        // Eight writers race for offset 0; exactly one wins
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                manager.write_chunk(&id, 0, b"x").await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::OffsetMismatch { expected, .. }) => assert_eq!(expected, 1),
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(manager.status(&session.id).await.unwrap().bytes_received, 1);
    }

    #[tokio::test]
    async fn test_lock_entries_released() {
        let (manager, _store, dir) = create_test_manager().await;

        for i in 0..1000 {
            let result = manager.write_chunk(&format!("bogus-session-{}", i), 0, b"x").await;
            assert!(matches!(result, Err(AppError::NotFound(_))));
        }
        assert!(manager.abort("unknown").await.is_err());
        assert_eq!(manager.lock_count(), 0);

        let session = manager
            .create_session("clip.mov", 3, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&session.id, 0, b"abc").await.unwrap();
        manager
            .finalize(&session.id, &dir.path().join("perm").join("clip.mov"))
            .await
            .unwrap();
        manager.reap(24).await.unwrap();

        assert_eq!(manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_waiting() {
        let (manager, _store, _dir) = create_test_manager().await;

        let held = manager.lock("shared").await;
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.lock("shared").await;
            })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(held);
        assert!(manager.lock_count() <= 1);
        waiter.await.unwrap();
        assert_eq!(manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let (manager, _store, _dir) = create_test_manager().await;

        let held = manager.lock("shared").await;
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(10), manager.lock("shared")).await;
        assert!(waited.is_err());

        drop(held);
        assert_eq!(manager.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_reap_rejects_out_of_range_age() {
        let (manager, _store, _dir) = create_test_manager().await;
        let session = manager
            .create_session("clip.mov", 10, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&session.id, 0, b"abc").await.unwrap();

        for age in [-1, 0, MAX_REAP_AGE_HOURS + 1, i64::MAX] {
            assert!(matches!(
                manager.reap(age).await,
                Err(AppError::InvalidInput(_))
            ));
        }

        assert_eq!(
            manager.status(&session.id).await.unwrap().status,
            SessionStatus::InProgress
        );
    }

    /// Delegates to a filesystem store but refuses to record a finalized session
    struct RefuseFinalizedSave(FsSessionStore);

    #[async_trait::async_trait]
    impl SessionStore for RefuseFinalizedSave {
        async fn allocate(&self, id: &str, size: u64) -> Result<()> {
            self.0.allocate(id, size).await
        }
        async fn write_at(&self, id: &str, offset: u64, data: &[u8]) -> Result<()> {
            self.0.write_at(id, offset, data).await
        }
        async fn move_data(&self, id: &str, destination: &Path) -> Result<()> {
            self.0.move_data(id, destination).await
        }
        async fn restore_data(&self, id: &str, source: &Path) -> Result<()> {
            self.0.restore_data(id, source).await
        }
        async fn remove_data(&self, id: &str) -> Result<bool> {
            self.0.remove_data(id).await
        }
        async fn save(&self, session: &UploadSession) -> Result<()> {
            if session.status == SessionStatus::Finalized {
                return Err(AppError::Io(std::io::Error::new(ErrorKind::Other, "disk full")));
            }
            self.0.save(session).await
        }
        async fn load(&self, id: &str) -> Result<Option<UploadSession>> {
            self.0.load(id).await
        }
        async fn delete(&self, id: &str) -> Result<bool> {
            self.0.delete(id).await
        }
        async fn list(&self) -> Result<Vec<UploadSession>> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn test_failed_finalize_record_restores_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSessionStore::open(temp_dir.path().join("temp")).await.unwrap();
        let manager = SessionManager::new(Arc::new(RefuseFinalizedSave(store.clone())), u64::MAX);

        let session = manager
            .create_session("clip.mov", 3, SessionMetadata::default())
            .await
            .unwrap();
        manager.write_chunk(&session.id, 0, b"abc").await.unwrap();

        let destination = temp_dir.path().join("perm").join("clip.mov");
        assert!(manager.finalize(&session.id, &destination).await.is_err());

        assert!(!destination.exists());
        assert_eq!(std::fs::read(store.data_path(&session.id)).unwrap(), b"abc");
        assert_eq!(
            manager.status(&session.id).await.unwrap().status,
            SessionStatus::Completed
        );
    }
}

//! Relay of a complete inbound upload into a remote resumable session
//!
//! For clients that cannot speak the resumable protocol themselves. The body is
//! re-cut into fixed-size chunks and each chunk's offset is checked against
//! what the remote reports, so a short or long transfer never passes as success.

use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::types::RelayOutcome;
use crate::error::{AppError, Result};
use crate::tus::TusMetadata;

/// Chunk size for PATCH requests (5 MiB, a multiple of 256 KiB)
pub const RELAY_CHUNK_SIZE: usize = 5 * 1024 * 1024;

const SPOOL_READ_SIZE: usize = 256 * 1024;

/// Remote endpoint accepting a resumable upload
#[async_trait::async_trait]
pub trait ResumableTarget: Send + Sync {
    /// Open a session for `length` bytes and return its URL
    async fn create_session(&self, length: u64, metadata: &TusMetadata) -> Result<String>;

    /// Send one chunk at `offset`; returns the offset the remote now reports
    async fn append(&self, session_url: &str, offset: u64, chunk: Bytes) -> Result<u64>;

    /// Drop a session that will not be completed
    async fn terminate(&self, session_url: &str) -> Result<()>;
}

/// Last path segment of a session URL, which the platform uses as the video id
pub fn video_id_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Spooling
// ============================================================================

/// Inbound body written to a temp file so its exact length is known
///
/// The file is removed when this value is dropped.
pub struct SpooledBody {
    file: NamedTempFile,
    len: u64,
}

impl SpooledBody {
    /// Drain `body` into a temp file under `dir`
    pub async fn spool<S>(dir: &Path, body: S) -> Result<Self>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        tokio::fs::create_dir_all(dir).await?;
        let named = tempfile::Builder::new()
            .prefix("relay-")
            .suffix(".spool")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(named.reopen()?);

        futures::pin_mut!(body);
        let mut len = 0u64;
        while let Some(piece) = body.next().await {
            let piece = piece?;
            file.write_all(&piece).await?;
            len += piece.len() as u64;
        }
        file.flush().await?;

        Ok(Self { file: named, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the spooled bytes back as a stream
    pub async fn stream(&self) -> Result<impl Stream<Item = Result<Bytes>>> {
        let file = tokio::fs::File::open(self.file.path()).await?;

        Ok(futures::stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; SPOOL_READ_SIZE];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, AppError>(None);
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), file)))
        }))
    }
}

// ============================================================================
// Relay Uploader
// ============================================================================

#[derive(Clone)]
pub struct RelayUploader {
    target: Arc<dyn ResumableTarget>,
    chunk_size: usize,
    max_duration_seconds: u32,
}

impl RelayUploader {
    pub fn new(target: Arc<dyn ResumableTarget>, max_duration_seconds: u32) -> Self {
        Self {
            target,
            chunk_size: RELAY_CHUNK_SIZE,
            max_duration_seconds,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Relay a body whose length the caller declares up front
    pub async fn relay<S>(&self, filename: &str, declared: u64, body: S) -> Result<RelayOutcome>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        if declared == 0 {
            return Err(AppError::InvalidInput("Upload-Length must be positive".to_string()));
        }

        let metadata = TusMetadata::new()
            .with("name", filename)
            .with("maxDurationSeconds", self.max_duration_seconds.to_string());

        let session_url = self.target.create_session(declared, &metadata).await?;
        tracing::info!(
            session_url = %session_url,
            filename = %filename,
            declared,
            "Opened relay session"
        );

        match self.pump(&session_url, declared, body).await {
            Ok(chunks) => {
                let video_id = video_id_from_url(&session_url);
                tracing::info!(video_id = %video_id, bytes = declared, chunks, "Relay complete");
                Ok(RelayOutcome {
                    video_id,
                    session_url,
                    bytes_relayed: declared,
                    chunks,
                })
            }
            Err(e) => {
                tracing::warn!(session_url = %session_url, error = %e, "Relay failed");
                if let Err(te) = self.target.terminate(&session_url).await {
                    tracing::warn!(session_url = %session_url, error = %te, "Could not terminate relay session");
                }
                Err(e)
            }
        }
    }

    /// Spool a body of unknown length, then relay it; the spool file never outlives the call
    pub async fn relay_unsized<S>(&self, filename: &str, spool_dir: &Path, body: S) -> Result<RelayOutcome>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let spooled = SpooledBody::spool(spool_dir, body).await?;
        tracing::debug!(bytes = spooled.len(), "Spooled relay body");

        if spooled.is_empty() {
            return Err(AppError::InvalidInput("file is empty".to_string()));
        }

        let stream = spooled.stream().await?;
        self.relay(filename, spooled.len(), stream).await
    }

    /// Re-cut `body` into chunks and send them in order; returns the chunk count
    async fn pump<S>(&self, session_url: &str, declared: u64, body: S) -> Result<u32>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        futures::pin_mut!(body);

        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let mut offset = 0u64;
        let mut chunks = 0u32;

        while let Some(piece) = body.next().await {
            buffer.extend_from_slice(&piece?);

            while buffer.len() >= self.chunk_size {
                let chunk = buffer.split_to(self.chunk_size).freeze();
                offset = self.send_chunk(session_url, declared, offset, chunk).await?;
                chunks += 1;
            }
        }

        if !buffer.is_empty() {
            let chunk = buffer.split().freeze();
            offset = self.send_chunk(session_url, declared, offset, chunk).await?;
            chunks += 1;
        }

        if offset != declared {
            return Err(AppError::Integrity {
                declared,
                relayed: offset,
            });
        }

        Ok(chunks)
    }

    async fn send_chunk(
        &self,
        session_url: &str,
        declared: u64,
        offset: u64,
        chunk: Bytes,
    ) -> Result<u64> {
        let next = offset + chunk.len() as u64;
        if next > declared {
            return Err(AppError::Integrity {
                declared,
                relayed: next,
            });
        }

        let reported = self.target.append(session_url, offset, chunk).await?;
        if reported != next {
            tracing::warn!(
                offset,
                expected = next,
                reported,
                "Remote offset disagrees with relayed bytes"
            );
            return Err(AppError::Integrity {
                declared,
                relayed: reported,
            });
        }

        tracing::debug!(offset = next, declared, "Relayed chunk");
        Ok(next)
    }
}

/// Scripted target for tests
#[cfg(test)]
pub struct MockTarget {
    pub received: std::sync::Mutex<Vec<(u64, usize)>>,
    pub terminated: std::sync::Mutex<Vec<String>>,
    pub metadata: std::sync::Mutex<Option<TusMetadata>>,
    /// Bytes silently dropped from every append
    pub short_by: u64,
}

#[cfg(test)]
impl MockTarget {
    pub fn new() -> Self {
        Self {
            received: std::sync::Mutex::new(Vec::new()),
            terminated: std::sync::Mutex::new(Vec::new()),
            metadata: std::sync::Mutex::new(None),
            short_by: 0,
        }
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl ResumableTarget for MockTarget {
    async fn create_session(&self, _length: u64, metadata: &TusMetadata) -> Result<String> {
        *self.metadata.lock().unwrap() = Some(metadata.clone());
        Ok("https://upload.example.test/tus/f65014bc6ff5419ea86e7972a047ba22?tusv2=true".to_string())
    }

    async fn append(&self, _session_url: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        self.received.lock().unwrap().push((offset, chunk.len()));
        Ok(offset + chunk.len() as u64 - self.short_by)
    }

    async fn terminate(&self, session_url: &str) -> Result<()> {
        self.terminated.lock().unwrap().push(session_url.to_string());
        Ok(())
    }
}

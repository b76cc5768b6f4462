//! Ingest Server Library
//!
//! Resumable uploads of camera media, routed by format:
//!
//! # Modules
//!
//! - `format`: Extension-based routing into RAW and delivery formats
//! - `upload`: Chunked sessions buffered on local disk, plus the reaper
//! - `storage`: Multipart uploads into an S3-compatible object store
//! - `stream`: Media platform client and the server-side chunked relay
//! - `probe`: `ffprobe` inspection of finalized files
//! - `routes`: HTTP surface

pub mod config;
pub mod error;
pub mod format;
pub mod probe;
pub mod routes;
pub mod state;
pub mod storage;
pub mod stream;
pub mod tus;
pub mod upload;

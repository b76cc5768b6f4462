//! Object storage for RAW footage
//!
//! Supports Cloudflare R2, MinIO and AWS S3 through the multipart API.

#[cfg(test)]
pub(crate) mod memory;
mod multipart;
mod s3_client;
mod types;

pub use multipart::{object_key, MultipartBackend, MultipartManager, MAX_PART_NUMBER};
pub use s3_client::S3Client;
pub use types::*;

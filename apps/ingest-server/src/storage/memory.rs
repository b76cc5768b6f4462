//! In-memory multipart backend for tests
//!
//! Mirrors S3's completion rules: every uploaded part must be listed with its
//! current ETag, otherwise completion fails with `InvalidPart`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::multipart::MultipartBackend;
use super::types::CompletedPart;
use crate::error::{AppError, Result};

struct PendingUpload {
    key: String,
    metadata: BTreeMap<String, String>,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Default)]
struct State {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, (Vec<u8>, BTreeMap<String, String>)>,
}

pub struct MemoryBackend {
    bucket: String,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.objects.get(key).map(|(data, _)| data.clone())
    }

    pub fn object_metadata(&self, key: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock().unwrap();
        state.objects.get(key).map(|(_, metadata)| metadata.clone())
    }

    pub fn has_upload(&self, upload_id: &str) -> bool {
        self.state.lock().unwrap().uploads.contains_key(upload_id)
    }
}

fn etag(data: &[u8]) -> String {
    format!("\"{}\"", &hex::encode(Sha256::digest(data))[..32])
}

#[async_trait::async_trait]
impl MultipartBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart(
        &self,
        key: &str,
        _content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        self.state.lock().unwrap().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| {
                AppError::Backend("NoSuchUpload: The specified upload does not exist".to_string())
            })?;

        let tag = etag(&data);
        upload.parts.insert(part_number, (tag.clone(), data));
        Ok(tag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| {
                AppError::Backend("NoSuchUpload: The specified upload does not exist".to_string())
            })?;

        // Every uploaded part listed exactly once
        let listed: BTreeSet<i32> = parts.iter().map(|p| p.part_number).collect();
        let listed_all = listed.len() == parts.len()
            && listed.len() == upload.parts.len()
            && listed.iter().all(|n| upload.parts.contains_key(n));

        let mut body = Vec::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((tag, data)) if *tag == part.etag && listed_all => {
                    body.extend_from_slice(data)
                }
                _ => {
                    return Err(AppError::Backend(
                        "InvalidPart: One or more of the specified parts could not be found"
                            .to_string(),
                    ))
                }
            }
        }

        let metadata = upload.metadata.clone();
        state.uploads.remove(upload_id);
        state.objects.insert(key.to_string(), (body, metadata));

        Ok(Some(format!("memory://{}/{}", self.bucket, key)))
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<()> {
        match self.state.lock().unwrap().uploads.remove(upload_id) {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Multipart upload {}", upload_id))),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            ttl.as_secs()
        ))
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String> {
        Ok(format!(
            "memory://{}/{}?uploadId={}&partNumber={}&expires={}",
            self.bucket,
            key,
            upload_id,
            part_number,
            ttl.as_secs()
        ))
    }
}

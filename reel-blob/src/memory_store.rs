use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::store::{MultipartObjectStore, PartTag, UploadId};
use crate::{BlobError, BlobResult};

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: Option<String>,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<UploadId, PendingUpload>,
    objects: HashMap<String, (Bytes, Option<String>)>,
    fail_part: Option<i32>,
    aborted: usize,
}

/// Multipart object store held in memory. Useful for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload of `part_number` fail.
    pub fn fail_on_part(&self, part_number: i32) {
        self.inner.lock().fail_part = Some(part_number);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().objects.get(key).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.inner.lock().objects.get(key).and_then(|(_, ct)| ct.clone())
    }

    pub fn pending_uploads(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn aborted_uploads(&self) -> usize {
        self.inner.lock().aborted
    }
}

#[async_trait]
impl MultipartObjectStore for MemoryObjectStore {
    async fn create_upload(&self, key: &str, content_type: Option<&str>) -> BlobResult<UploadId> {
        let id = UploadId(uuid::Uuid::new_v4().to_string());
        self.inner.lock().pending.insert(
            id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.map(str::to_string),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part(&self, upload_id: &UploadId, part_number: i32, data: Bytes) -> BlobResult<PartTag> {
        let mut inner = self.inner.lock();
        if inner.fail_part == Some(part_number) {
            return Err(BlobError::upload_failed(format!("part {part_number} rejected")));
        }
        let upload = inner
            .pending
            .get_mut(upload_id)
            .ok_or_else(|| BlobError::not_found(upload_id.as_str()))?;
        let etag = format!("\"{}-{}\"", part_number, data.len());
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(PartTag { part_number, etag })
    }

    async fn complete_upload(&self, upload_id: &UploadId, parts: Vec<PartTag>) -> BlobResult<()> {
        let mut inner = self.inner.lock();
        let upload = inner
            .pending
            .remove(upload_id)
            .ok_or_else(|| BlobError::not_found(upload_id.as_str()))?;

        let mut body = BytesMut::new();
        let mut tags = parts;
        tags.sort_by_key(|t| t.part_number);
        for tag in &tags {
            match upload.parts.get(&tag.part_number) {
                Some((etag, data)) if *etag == tag.etag => body.extend_from_slice(data),
                _ => {
                    return Err(BlobError::invalid(format!(
                        "unknown part {} for upload {}",
                        tag.part_number,
                        upload_id.as_str()
                    )))
                }
            }
        }
        inner
            .objects
            .insert(upload.key, (body.freeze(), upload.content_type));
        Ok(())
    }

    async fn abort_upload(&self, upload_id: &UploadId) -> BlobResult<()> {
        let mut inner = self.inner.lock();
        inner
            .pending
            .remove(upload_id)
            .ok_or_else(|| BlobError::not_found(upload_id.as_str()))?;
        inner.aborted += 1;
        Ok(())
    }
}

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, instrument, warn};

use crate::{BlobResult, RemoteObject};

/// Part size used by the remote handoff. S3 requires every part but the
/// last to be at least 5 MiB.
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Identifier of an in-progress remote multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Receipt for one uploaded part, needed to complete the upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTag {
    pub part_number: i32,
    pub etag: String,
}

/// Object storage that accepts an object in numbered parts.
///
/// Part numbers start at 1. Completing an upload publishes the parts in
/// part-number order as one object.
#[async_trait]
pub trait MultipartObjectStore: Send + Sync {
    async fn create_upload(&self, key: &str, content_type: Option<&str>) -> BlobResult<UploadId>;

    async fn upload_part(&self, upload_id: &UploadId, part_number: i32, data: Bytes) -> BlobResult<PartTag>;

    async fn complete_upload(&self, upload_id: &UploadId, parts: Vec<PartTag>) -> BlobResult<()>;

    async fn abort_upload(&self, upload_id: &UploadId) -> BlobResult<()>;
}

/// Pushes local media to a [`MultipartObjectStore`] in fixed-size parts.
#[derive(Clone)]
pub struct RemoteHandoff {
    store: Arc<dyn MultipartObjectStore>,
    part_size: usize,
    key_prefix: String,
}

impl RemoteHandoff {
    pub fn new(store: Arc<dyn MultipartObjectStore>) -> Self {
        Self {
            store,
            part_size: DEFAULT_PART_SIZE,
            key_prefix: "videos/".to_string(),
        }
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn remote_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    /// Upload everything `reader` yields as `{prefix}{name}`.
    ///
    /// An empty source still produces one (empty) part so the object exists.
    /// On any failure the remote upload is aborted before returning.
    #[instrument(skip(self, reader), fields(key = %self.remote_key(name)))]
    pub async fn push<R>(&self, name: &str, content_type: Option<&str>, mut reader: R) -> BlobResult<RemoteObject>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = self.remote_key(name);
        let upload_id = self.store.create_upload(&key, content_type).await?;

        match self.send_parts(&upload_id, &mut reader).await {
            Ok((parts, size_bytes)) => {
                let count = parts.len();
                if let Err(e) = self.store.complete_upload(&upload_id, parts).await {
                    self.abort(&upload_id).await;
                    return Err(e);
                }
                info!(parts = count, size_bytes, "remote upload complete");
                Ok(RemoteObject {
                    key,
                    upload_id: upload_id.0,
                    parts: count,
                    size_bytes,
                })
            }
            Err(e) => {
                self.abort(&upload_id).await;
                Err(e)
            }
        }
    }

    pub async fn push_file(&self, path: &Path, name: &str, content_type: Option<&str>) -> BlobResult<RemoteObject> {
        let file = tokio::fs::File::open(path).await?;
        self.push(name, content_type, file).await
    }

    async fn send_parts<R>(&self, upload_id: &UploadId, reader: &mut R) -> BlobResult<(Vec<PartTag>, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut part_number = 1;
        loop {
            let mut buf = Vec::with_capacity(self.part_size);
            (&mut *reader).take(self.part_size as u64).read_to_end(&mut buf).await?;
            let n = buf.len();
            if n == 0 && part_number > 1 {
                break;
            }
            parts.push(self.store.upload_part(upload_id, part_number, Bytes::from(buf)).await?);
            total += n as u64;
            if n < self.part_size {
                break;
            }
            part_number += 1;
        }
        Ok((parts, total))
    }

    async fn abort(&self, upload_id: &UploadId) {
        if let Err(e) = self.store.abort_upload(upload_id).await {
            warn!(upload_id = upload_id.as_str(), error = %e, "failed to abort remote upload");
        }
    }
}

impl std::fmt::Debug for RemoteHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandoff")
            .field("part_size", &self.part_size)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

use std::sync::Arc;

use bytes::Bytes;

use crate::delivery::{self, DeliveryPolicy, MediaHandle, PartialContent};
use crate::{
    BlobError, BlobResult, ChunkPut, ChunkReceipt, MediaConfig, MediaKey, MediaLibrary,
    MergedArtifact, MultipartObjectStore, RemoteHandoff, RemoteObject, SplitUpload,
    StoredMedia, UploadCoordinator, UploadSession,
};

/// Everything a transport needs to serve and accept media.
///
/// Embed one `MediaAdapter` per media root; it owns the upload registry, so
/// share it behind an `Arc` rather than building several.
#[derive(Debug)]
pub struct MediaAdapter {
    config: MediaConfig,
    library: MediaLibrary,
    uploads: UploadCoordinator,
    remote: Option<RemoteHandoff>,
}

impl MediaAdapter {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            library: MediaLibrary::new(&config.media_root),
            uploads: UploadCoordinator::new(&config),
            remote: None,
            config,
        }
    }

    /// Attach remote object storage. Completed chunked uploads are pushed to
    /// it and [`push_remote`](Self::push_remote) becomes available.
    pub fn with_remote(mut self, store: Arc<dyn MultipartObjectStore>) -> Self {
        let handoff = RemoteHandoff::new(store)
            .with_part_size(self.config.remote_part_size)
            .with_key_prefix(self.config.remote_key_prefix.clone());
        self.uploads = self.uploads.with_handoff(handoff.clone());
        self.remote = Some(handoff);
        self
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn open(&self, name: &str) -> BlobResult<MediaHandle> {
        self.library.open(name).await
    }

    /// Open `name` and serve the part selected by `range` under `policy`.
    pub async fn deliver(
        &self,
        name: &str,
        range: Option<&str>,
        policy: &DeliveryPolicy,
    ) -> BlobResult<PartialContent> {
        let handle = self.library.open(name).await?;
        delivery::serve(handle, range, policy).await
    }

    pub async fn upload_chunk(&self, file_name: &str, put: ChunkPut) -> BlobResult<ChunkReceipt> {
        self.uploads.accept_chunk(file_name, put).await
    }

    pub async fn complete_upload(&self, file_name: &str) -> BlobResult<MergedArtifact> {
        self.uploads.complete(file_name).await
    }

    pub async fn upload_status(&self, file_name: &str) -> BlobResult<UploadSession> {
        self.uploads.status(file_name).await
    }

    pub async fn abort_upload(&self, file_name: &str) -> BlobResult<usize> {
        self.uploads.abort(file_name).await
    }

    /// Split a whole file into staged chunks under `file_name`. A later
    /// [`complete_upload`](Self::complete_upload) merges them.
    pub async fn split_upload(
        &self,
        file_name: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> BlobResult<SplitUpload> {
        self.config
            .upload_rules
            .validate_file(data.len() as u64, content_type, Some(file_name))?;
        self.uploads.split(file_name, data, content_type).await
    }

    /// Single-shot upload into the media root under a generated name.
    pub async fn store_file(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        client_name: Option<&str>,
    ) -> BlobResult<StoredMedia> {
        self.config
            .upload_rules
            .validate_file(data.len() as u64, content_type, client_name)?;
        self.library.store_new(data, content_type, client_name).await
    }

    /// Send a complete file straight to remote storage.
    pub async fn push_remote(
        &self,
        name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> BlobResult<RemoteObject> {
        let handoff = self
            .remote
            .as_ref()
            .ok_or_else(|| BlobError::unsupported("remote object storage is not configured"))?;
        let key = MediaKey::parse(name)?;
        self.config
            .upload_rules
            .validate_file(data.len() as u64, content_type, Some(key.as_str()))?;
        handoff
            .push(key.as_str(), content_type, std::io::Cursor::new(data))
            .await
    }
}

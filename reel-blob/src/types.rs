use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Stream of byte chunks, used for response bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Validated media name.
///
/// Used both as the staging namespace of a chunked upload and as a file name
/// under the media root, so it must be a single, non-hidden path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaKey(String);

impl MediaKey {
    pub const MAX_LEN: usize = 255;

    pub fn parse(raw: impl AsRef<str>) -> BlobResult<Self> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(BlobError::invalid("File name must not be empty."));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(BlobError::invalid(format!(
                "File name is longer than {} bytes.",
                Self::MAX_LEN
            )));
        }
        if raw.starts_with('.') {
            return Err(BlobError::invalid(format!("Invalid file name: {raw}")));
        }
        if raw.contains(&['/', '\\', '\0'][..]) {
            return Err(BlobError::invalid(format!("Invalid file name: {raw}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MediaKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MediaKey {
    type Error = BlobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MediaKey> for String {
    fn from(key: MediaKey) -> Self {
        key.0
    }
}

/// One chunk of a chunked upload, as received from a client.
#[derive(Debug, Clone)]
pub struct ChunkPut {
    /// 1-based position within the upload
    pub index: u32,
    /// Declared number of chunks; the latest declaration wins
    pub total: u32,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub data: Bytes,
}

impl ChunkPut {
    pub fn new(index: u32, total: u32, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            total,
            content_type: None,
            filename: None,
            data: data.into(),
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Acknowledgement for a staged chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReceipt {
    pub key: MediaKey,
    pub index: u32,
    pub total: u32,
    pub size_bytes: u64,
    /// Distinct indices staged so far, this one included
    pub received: u32,
}

impl ChunkReceipt {
    pub fn message(&self) -> String {
        format!("Chunk {} of {} uploaded successfully.", self.index, self.total)
    }
}

/// A chunked upload reassembled into a single file.
#[derive(Debug, Clone, Serialize)]
pub struct MergedArtifact {
    pub key: MediaKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub chunks: u32,
    pub remote: Option<RemoteObject>,
}

impl MergedArtifact {
    pub fn message(&self) -> String {
        format!("File upload completed successfully: {}", self.path.display())
    }
}

/// A whole file split server-side into staged chunks.
#[derive(Debug, Clone, Serialize)]
pub struct SplitUpload {
    pub key: MediaKey,
    pub chunks: u32,
    pub size_bytes: u64,
}

impl SplitUpload {
    pub fn message(&self) -> String {
        "File successfully split into chunks and saved.".to_string()
    }
}

/// A single-shot upload written straight into the media root.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMedia {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

impl StoredMedia {
    pub fn message(&self) -> String {
        format!("File uploaded successfully to: {}", self.path.display())
    }
}

/// Object written to remote storage by a multipart handoff.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteObject {
    pub key: String,
    pub upload_id: String,
    pub parts: usize,
    pub size_bytes: u64,
}

/// Progress of a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub key: MediaKey,
    pub total_chunks: u32,
    pub received: BTreeSet<u32>,
    pub received_bytes: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UploadSession {
    pub fn new(key: MediaKey, total_chunks: u32) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            key,
            total_chunks,
            received: BTreeSet::new(),
            received_bytes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a staged chunk. A re-upload of an index replaces the earlier one,
    /// so its bytes are counted again; `received_bytes` is therefore an upper
    /// bound once clients retry.
    pub fn record(&mut self, index: u32, total: u32, size: u64) {
        self.total_chunks = total;
        self.received.insert(index);
        self.received_bytes += size;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Indices in `1..=total_chunks` not staged yet.
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total_chunks)
            .filter(|i| !self.received.contains(i))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.total_chunks > 0 && self.missing().is_empty()
    }
}

/// Serialisable view of an [`UploadSession`] for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatus {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u32,
    pub received: Vec<u32>,
    pub missing: Vec<u32>,
    #[serde(rename = "receivedBytes")]
    pub received_bytes: u64,
    pub complete: bool,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

impl From<&UploadSession> for UploadStatus {
    fn from(session: &UploadSession) -> Self {
        Self {
            file_name: session.key.to_string(),
            total_chunks: session.total_chunks,
            received: session.received.iter().copied().collect(),
            missing: session.missing(),
            received_bytes: session.received_bytes,
            complete: session.is_complete(),
            updated_at: session.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_key_rejects_paths_and_hidden_names() {
        for bad in ["", "  ", "..", ".staging", "a/b", "a\\b", "../etc/passwd", "nul\0"] {
            assert!(MediaKey::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(MediaKey::parse("x".repeat(MediaKey::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn media_key_accepts_plain_names() {
        let key = MediaKey::parse(" movie-01.part ").unwrap();
        assert_eq!(key.as_str(), "movie-01.part");
    }

    #[test]
    fn media_key_deserialization_validates() {
        let ok: MediaKey = serde_json::from_str("\"movie\"").unwrap();
        assert_eq!(ok.as_str(), "movie");
        assert!(serde_json::from_str::<MediaKey>("\"../x\"").is_err());
    }

    #[test]
    fn session_tracks_missing_indices() {
        let mut session = UploadSession::new(MediaKey::parse("movie").unwrap(), 3);
        session.record(1, 3, 10);
        session.record(3, 3, 4);
        assert_eq!(session.missing(), vec![2]);
        assert!(!session.is_complete());

        session.record(2, 3, 10);
        assert!(session.is_complete());
        assert_eq!(session.received_bytes, 24);

        let status = UploadStatus::from(&session);
        assert_eq!(status.received, vec![1, 2, 3]);
        assert!(status.complete);
    }

    #[test]
    fn receipts_render_acknowledgements() {
        let receipt = ChunkReceipt {
            key: MediaKey::parse("movie").unwrap(),
            index: 2,
            total: 3,
            size_bytes: 5,
            received: 2,
        };
        assert_eq!(receipt.message(), "Chunk 2 of 3 uploaded successfully.");
    }
}

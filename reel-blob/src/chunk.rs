use std::ops::Range;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, instrument};

use crate::library::write_atomic;
use crate::{BlobResult, ChunkPut, MediaKey, UploadRules};

pub(crate) const CHUNK_PREFIX: &str = "chunk-";

/// File name of a staged chunk.
pub fn chunk_file_name(index: u32) -> String {
    format!("{CHUNK_PREFIX}{index}")
}

/// Index encoded in a staged chunk's file name, if it is one.
pub fn parse_chunk_index(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix(CHUNK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Writes validated chunks into `{staging_root}/{file_name}/chunk-{index}`.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    staging_root: PathBuf,
    rules: UploadRules,
}

impl ChunkWriter {
    pub fn new(staging_root: impl Into<PathBuf>, rules: UploadRules) -> Self {
        Self {
            staging_root: staging_root.into(),
            rules,
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn staging_dir(&self, key: &MediaKey) -> PathBuf {
        self.staging_root.join(key.as_str())
    }

    pub fn validate(&self, put: &ChunkPut) -> BlobResult<()> {
        self.rules.validate_chunk(put)
    }

    /// Stage one chunk. Rewriting an index replaces the earlier bytes
    /// atomically, so readers never observe a half-written chunk.
    #[instrument(skip(self, put), fields(key = %key, index = put.index, total = put.total, size = put.data.len()))]
    pub async fn write(&self, key: &MediaKey, put: &ChunkPut) -> BlobResult<u64> {
        self.validate(put)?;

        let dir = self.staging_dir(key);
        fs::create_dir_all(&dir).await?;
        write_atomic(&dir.join(chunk_file_name(put.index)), &put.data).await?;

        debug!("chunk staged");
        Ok(put.len())
    }
}

/// Splits `total_len` bytes into consecutive pieces of at most `piece_len`.
///
/// Zero bytes split into zero pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_len: u64,
    piece_len: u64,
}

impl ChunkPlan {
    pub fn new(total_len: u64, piece_len: u64) -> Self {
        Self {
            total_len,
            piece_len: piece_len.max(1),
        }
    }

    /// Number of pieces, saturating at `u32::MAX`.
    pub fn count(&self) -> u32 {
        u32::try_from(self.total_len.div_ceil(self.piece_len)).unwrap_or(u32::MAX)
    }

    /// Byte range of the 1-based `index`.
    pub fn piece(&self, index: u32) -> Option<Range<u64>> {
        if index == 0 || index > self.count() {
            return None;
        }
        let start = (index as u64 - 1) * self.piece_len;
        let end = (start + self.piece_len).min(self.total_len);
        Some(start..end)
    }

    pub fn pieces(&self) -> impl Iterator<Item = (u32, Range<u64>)> + '_ {
        (1..=self.count()).filter_map(move |i| self.piece(i).map(|r| (i, r)))
    }
}

use std::path::{Path, PathBuf};

use crate::{BlobError, BlobResult, ChunkPut};

const MIB: u64 = 1024 * 1024;

/// Piece size of server-side splitting.
pub const DEFAULT_SPLIT_PIECE_BYTES: u64 = MIB;

/// What a merge accepts when chunk indices have gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completeness {
    /// Concatenate whatever is staged, in index order. Gaps are logged.
    #[default]
    AsStaged,
    /// Refuse to merge unless every index from 1 to the declared total is
    /// staged.
    Contiguous,
}

/// Layout and limits for the media root and the staging area
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Directory served by the stream routes and holding merged artifacts
    pub media_root: PathBuf,
    /// Directory holding `{file_name}/chunk-{index}` during chunked uploads
    pub staging_root: PathBuf,
    /// Extension given to merged artifacts
    pub artifact_extension: String,
    pub upload_rules: UploadRules,
    pub completeness: Completeness,
    /// Part size used when handing merged files to remote object storage
    pub remote_part_size: usize,
    /// Prefix of remote object keys
    pub remote_key_prefix: String,
    /// Piece size when a whole file is split into staged chunks
    pub split_piece_size: u64,
}

impl MediaConfig {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        let media_root = media_root.into();
        Self {
            staging_root: media_root.join(".staging"),
            media_root,
            artifact_extension: "mp4".to_string(),
            upload_rules: UploadRules::default(),
            completeness: Completeness::default(),
            remote_part_size: crate::store::DEFAULT_PART_SIZE,
            remote_key_prefix: "videos/".to_string(),
            split_piece_size: DEFAULT_SPLIT_PIECE_BYTES,
        }
    }

    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = staging_root.into();
        self
    }

    pub fn with_artifact_extension<S: Into<String>>(mut self, ext: S) -> Self {
        self.artifact_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_upload_rules(mut self, rules: UploadRules) -> Self {
        self.upload_rules = rules;
        self
    }

    pub fn with_completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = completeness;
        self
    }

    pub fn with_remote_part_size(mut self, size: usize) -> Self {
        self.remote_part_size = size;
        self
    }

    pub fn with_remote_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.remote_key_prefix = prefix.into();
        self
    }

    pub fn with_split_piece_size(mut self, size: u64) -> Self {
        self.split_piece_size = size.max(1);
        self
    }
}

/// Limits applied to incoming uploads
#[derive(Debug, Clone)]
pub struct UploadRules {
    /// Largest accepted chunk
    pub max_chunk_bytes: u64,
    /// Largest accepted single-shot upload
    pub max_file_bytes: u64,
    /// Accepted content types, empty allows all
    pub allowed_content_types: Vec<String>,
    /// Accepted file extensions (lowercase, no dot), empty allows all
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 20 * MIB,
            max_file_bytes: 50 * MIB,
            allowed_content_types: Vec::new(),
            allowed_extensions: Vec::new(),
        }
    }
}

impl UploadRules {
    /// Content types the single-shot video upload accepted historically.
    pub fn video_content_types() -> Vec<String> {
        ["video/mp4", "video/mkv", "video/x-matroska", "application/octet-stream"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn with_max_chunk_bytes(mut self, max: u64) -> Self {
        self.max_chunk_bytes = max;
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn with_allowed_content_types(mut self, types: Vec<String>) -> Self {
        self.allowed_content_types = types;
        self
    }

    pub fn with_allowed_extensions(mut self, exts: Vec<String>) -> Self {
        self.allowed_extensions = exts
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Checks a chunk before anything touches disk.
    pub fn validate_chunk(&self, put: &ChunkPut) -> BlobResult<()> {
        if put.is_empty() {
            return Err(BlobError::invalid(format!("Chunk {} is empty.", put.index)));
        }
        if put.len() > self.max_chunk_bytes {
            return Err(BlobError::invalid(format!(
                "Chunk size exceeds the limit of {}.",
                describe_size(self.max_chunk_bytes)
            )));
        }
        if put.total == 0 {
            return Err(BlobError::invalid("Total chunks must be at least 1."));
        }
        if put.index == 0 || put.index > put.total {
            return Err(BlobError::invalid(format!(
                "Invalid chunk index {}: must be between 1 and {}.",
                put.index, put.total
            )));
        }
        self.validate_metadata(put.content_type.as_deref(), put.filename.as_deref())
    }

    /// Checks a complete file for the single-shot upload path.
    pub fn validate_file(
        &self,
        size: u64,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> BlobResult<()> {
        if size == 0 {
            return Err(BlobError::invalid("File is empty."));
        }
        if size > self.max_file_bytes {
            return Err(BlobError::invalid(format!(
                "File size exceeds the limit of {}.",
                describe_size(self.max_file_bytes)
            )));
        }
        self.validate_metadata(content_type, filename)
    }

    fn validate_metadata(&self, content_type: Option<&str>, filename: Option<&str>) -> BlobResult<()> {
        if !self.allowed_content_types.is_empty() {
            let ct = content_type.map(essence).unwrap_or_default();
            if !self.allowed_content_types.iter().any(|a| a.eq_ignore_ascii_case(&ct)) {
                return Err(BlobError::invalid(format!(
                    "Invalid file type: {}",
                    if ct.is_empty() { "unknown" } else { ct.as_str() }
                )));
            }
        }
        if !self.allowed_extensions.is_empty() {
            let ext = filename
                .and_then(|f| Path::new(f).extension())
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if !self.allowed_extensions.contains(&ext) {
                return Err(BlobError::invalid(format!(
                    "Invalid file extension: {}",
                    if ext.is_empty() { "none" } else { ext.as_str() }
                )));
            }
        }
        Ok(())
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn describe_size(bytes: u64) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, total: u32, len: usize) -> ChunkPut {
        ChunkPut::new(index, total, vec![7u8; len])
    }

    #[test]
    fn defaults_follow_service_limits() {
        let config = MediaConfig::new("/srv/media");
        assert_eq!(config.staging_root, PathBuf::from("/srv/media/.staging"));
        assert_eq!(config.artifact_extension, "mp4");
        assert_eq!(config.upload_rules.max_chunk_bytes, 20 * MIB);
        assert_eq!(config.upload_rules.max_file_bytes, 50 * MIB);
        assert_eq!(config.remote_part_size, 5 * 1024 * 1024);
        assert_eq!(config.completeness, Completeness::AsStaged);
    }

    #[test]
    fn chunk_validation_messages() {
        let rules = UploadRules::default().with_max_chunk_bytes(4);

        let empty = rules.validate_chunk(&chunk(3, 5, 0)).unwrap_err();
        assert_eq!(empty.to_string(), "Chunk 3 is empty.");

        let big = rules.validate_chunk(&chunk(1, 1, 5)).unwrap_err();
        assert_eq!(big.to_string(), "Chunk size exceeds the limit of 4 bytes.");

        let idx = rules.validate_chunk(&chunk(4, 3, 1)).unwrap_err();
        assert!(idx.is_invalid());
        assert!(rules.validate_chunk(&chunk(0, 3, 1)).is_err());
        assert!(rules.validate_chunk(&chunk(1, 0, 1)).is_err());
        assert!(rules.validate_chunk(&chunk(3, 3, 4)).is_ok());

        let default = UploadRules::default();
        let msg = default.validate_chunk(&chunk(1, 1, 20 * MIB as usize + 1)).unwrap_err();
        assert_eq!(msg.to_string(), "Chunk size exceeds the limit of 20 MB.");
    }

    #[test]
    fn content_type_and_extension_rules() {
        let rules = UploadRules::default()
            .with_allowed_content_types(UploadRules::video_content_types())
            .with_allowed_extensions(vec![".MP4".to_string(), "mkv".to_string()]);

        let ok = chunk(1, 1, 1)
            .with_content_type("video/mp4; codecs=avc1")
            .with_filename("Clip.Mp4");
        assert!(rules.validate_chunk(&ok).is_ok());

        let wrong_type = chunk(1, 1, 1).with_content_type("image/png").with_filename("a.mp4");
        assert_eq!(
            rules.validate_chunk(&wrong_type).unwrap_err().to_string(),
            "Invalid file type: image/png"
        );

        let wrong_ext = chunk(1, 1, 1).with_content_type("video/mp4").with_filename("a.exe");
        assert!(rules.validate_chunk(&wrong_ext).is_err());

        assert!(rules.validate_file(0, Some("video/mp4"), Some("a.mp4")).is_err());
        assert!(rules.validate_file(10, Some("video/mp4"), Some("a.mkv")).is_ok());
    }
}

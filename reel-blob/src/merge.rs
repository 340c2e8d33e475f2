use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::chunk::parse_chunk_index;
use crate::{BlobError, BlobResult, Completeness, MediaKey, MergedArtifact};

/// Reassembles staged chunks into `{media_root}/{file_name}.{ext}`.
#[derive(Debug, Clone)]
pub struct ChunkMerger {
    staging_root: PathBuf,
    media_root: PathBuf,
    extension: String,
}

impl ChunkMerger {
    pub fn new(
        staging_root: impl Into<PathBuf>,
        media_root: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            staging_root: staging_root.into(),
            media_root: media_root.into(),
            extension: extension.into(),
        }
    }

    pub fn staging_dir(&self, key: &MediaKey) -> PathBuf {
        self.staging_root.join(key.as_str())
    }

    pub fn artifact_path(&self, key: &MediaKey) -> PathBuf {
        if self.extension.is_empty() {
            self.media_root.join(key.as_str())
        } else {
            self.media_root
                .join(format!("{}.{}", key.as_str(), self.extension))
        }
    }

    /// Staged chunks of `key`, ascending by numeric index.
    ///
    /// `NotFound` when the staging directory does not exist.
    pub async fn staged(&self, key: &MediaKey) -> BlobResult<Vec<(u32, PathBuf)>> {
        let dir = self.staging_dir(key);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::not_found(format!(
                    "Directory not found for file: {key}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(parse_chunk_index) else {
                continue;
            };
            if entry.file_type().await?.is_file() {
                chunks.push((index, entry.path()));
            }
        }
        chunks.sort_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    /// Concatenate every staged chunk of `key` into the artifact, then remove
    /// the staging directory.
    ///
    /// Each chunk file is deleted as soon as it has been appended, so a
    /// failure part-way leaves only the chunks not yet consumed. A second
    /// call for the same key is `NotFound`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn merge(
        &self,
        key: &MediaKey,
        completeness: Completeness,
        declared_total: Option<u32>,
    ) -> BlobResult<MergedArtifact> {
        let chunks = self.staged(key).await?;
        if chunks.is_empty() {
            return Err(BlobError::not_found(format!("No chunks found for file: {key}")));
        }

        let highest = chunks.last().map(|(i, _)| *i).unwrap_or_default();
        let expected = declared_total.unwrap_or(highest).max(highest);
        let missing = missing_indices(&chunks, expected);
        if !missing.is_empty() {
            match completeness {
                Completeness::Contiguous => {
                    return Err(BlobError::invalid(format!(
                        "Missing chunks for file {key}: {}",
                        join(&missing)
                    )));
                }
                Completeness::AsStaged => {
                    warn!(missing = %join(&missing), "merging upload with gaps");
                }
            }
        }

        fs::create_dir_all(&self.media_root).await?;
        let target = self.artifact_path(key);
        let tmp = self
            .media_root
            .join(format!(".{}.{}.merging", key.as_str(), uuid::Uuid::new_v4()));

        let size = match concat_into(&tmp, &chunks).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::remove_dir_all(self.staging_dir(key)).await?;

        info!(path = %target.display(), size, chunks = chunks.len(), "merged upload");
        Ok(MergedArtifact {
            key: key.clone(),
            path: target,
            size_bytes: size,
            chunks: chunks.len() as u32,
            remote: None,
        })
    }

    /// Remove the staging directory of `key` and everything in it.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn discard(&self, key: &MediaKey) -> BlobResult<usize> {
        let chunks = self.staged(key).await?;
        fs::remove_dir_all(self.staging_dir(key)).await?;
        info!(chunks = chunks.len(), "discarded staged upload");
        Ok(chunks.len())
    }
}

async fn concat_into(tmp: &Path, chunks: &[(u32, PathBuf)]) -> BlobResult<u64> {
    let mut out = File::create(tmp).await?;
    let mut size = 0u64;
    for (_, path) in chunks {
        let mut src = File::open(path).await?;
        size += tokio::io::copy(&mut src, &mut out).await?;
        drop(src);
        fs::remove_file(path).await?;
    }
    out.flush().await?;
    out.sync_all().await?;
    Ok(size)
}

fn missing_indices(chunks: &[(u32, PathBuf)], expected: u32) -> Vec<u32> {
    let mut present = chunks.iter().map(|(i, _)| *i).peekable();
    let mut missing = Vec::new();
    for index in 1..=expected {
        while present.peek().is_some_and(|p| *p < index) {
            present.next();
        }
        if present.peek() != Some(&index) {
            missing.push(index);
        }
    }
    missing
}

fn join(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(indices: &[u32]) -> Vec<(u32, PathBuf)> {
        indices.iter().map(|i| (*i, PathBuf::from(format!("chunk-{i}")))).collect()
    }

    #[test]
    fn missing_indices_against_declared_total() {
        assert_eq!(missing_indices(&staged(&[1, 2, 3]), 3), Vec::<u32>::new());
        assert_eq!(missing_indices(&staged(&[1, 3]), 3), vec![2]);
        assert_eq!(missing_indices(&staged(&[2]), 4), vec![1, 3, 4]);
    }

    #[test]
    fn artifact_path_uses_extension() {
        let key = MediaKey::parse("movie").unwrap();
        let merger = ChunkMerger::new("/s", "/m", "mp4");
        assert_eq!(merger.artifact_path(&key), PathBuf::from("/m/movie.mp4"));
        let bare = ChunkMerger::new("/s", "/m", "");
        assert_eq!(bare.artifact_path(&key), PathBuf::from("/m/movie"));
    }
}

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument};

use crate::delivery::MediaHandle;
use crate::mime;
use crate::{BlobError, BlobResult, MediaKey, StoredMedia};

/// Read and write access to the media root.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &MediaKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Open a media file for delivery.
    ///
    /// Missing, unreadable and non-regular entries are all `NotFound`. The
    /// content type comes from the extension, or from the first bytes if
    /// there is none.
    #[instrument(skip(self), level = "debug")]
    pub async fn open(&self, name: &str) -> BlobResult<MediaHandle> {
        let key = MediaKey::parse(name)?;
        let path = self.path_for(&key);

        let unreadable = |e: std::io::Error| {
            debug!(path = %path.display(), error = %e, "media not readable");
            BlobError::not_found(key.as_str())
        };

        let meta = fs::metadata(&path).await.map_err(unreadable)?;
        if !meta.is_file() {
            return Err(BlobError::not_found(key.as_str()));
        }

        let mut file = File::open(&path).await.map_err(unreadable)?;
        let content_type = match mime::from_extension(&path) {
            Some(ct) => ct,
            None => {
                let mut head = [0u8; mime::SNIFF_LEN];
                let n = read_head(&mut file, &mut head).await.map_err(unreadable)?;
                mime::detect(&path, &head[..n])
            }
        };

        debug!(path = %path.display(), size = meta.len(), %content_type, "opened media");
        Ok(MediaHandle::new(key.to_string(), meta.len(), content_type, file))
    }

    /// Write a complete upload under a fresh name: `{uuid}{.ext}`, keeping the
    /// client's extension when it has one.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn store_new(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        client_name: Option<&str>,
    ) -> BlobResult<StoredMedia> {
        let ext = client_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let file_name = format!("{}{}", uuid::Uuid::new_v4(), ext);
        let path = self.root.join(&file_name);

        fs::create_dir_all(&self.root).await?;
        write_atomic(&path, &data).await?;

        info!(path = %path.display(), "stored upload");
        Ok(StoredMedia {
            file_name,
            path,
            size_bytes: data.len() as u64,
            content_type: content_type.map(str::to_string),
        })
    }
}

async fn read_head(file: &mut File, head: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Write `data` to a sibling temp file, fsync it, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blob");
    let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_reports_size_and_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mkv"), vec![1u8; 42]).await.unwrap();

        let lib = MediaLibrary::new(dir.path());
        let handle = lib.open("clip.mkv").await.unwrap();
        assert_eq!(handle.total, 42);
        assert_eq!(handle.content_type, "video/x-matroska");
    }

    #[tokio::test]
    async fn open_sniffs_extensionless_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftypmp42");
        data.resize(64, 0);
        fs::write(dir.path().join("movie"), &data).await.unwrap();

        let handle = MediaLibrary::new(dir.path()).open("movie").await.unwrap();
        assert_eq!(handle.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn missing_files_and_directories_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder")).await.unwrap();
        let lib = MediaLibrary::new(dir.path());

        assert!(lib.open("nope.mp4").await.unwrap_err().is_not_found());
        assert!(lib.open("folder").await.unwrap_err().is_not_found());
        assert!(lib.open("../etc/passwd").await.unwrap_err().is_invalid());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_entries_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("loop.mp4"), dir.path().join("loop.mp4")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.mp4"), dir.path().join("dangling.mp4")).unwrap();
        let lib = MediaLibrary::new(dir.path());

        assert!(lib.open("loop.mp4").await.unwrap_err().is_not_found());
        assert!(lib.open("dangling.mp4").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn store_new_keeps_extension_only() {
        let dir = tempfile::tempdir().unwrap();
        let lib = MediaLibrary::new(dir.path().join("media"));

        let stored = lib
            .store_new(Bytes::from_static(b"abc"), Some("video/mp4"), Some("../../Holiday.MP4"))
            .await
            .unwrap();
        assert!(stored.file_name.ends_with(".mp4"));
        assert_eq!(stored.path.parent(), Some(lib.root()));
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"abc");
        assert_eq!(stored.message(), format!("File uploaded successfully to: {}", stored.path.display()));
    }
}

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::{
    BlobError, BlobResult, ChunkMerger, ChunkPlan, ChunkPut, ChunkReceipt, ChunkWriter,
    Completeness, MediaConfig, MediaKey, MergedArtifact, RemoteHandoff, SessionRegistry,
    SplitUpload, UploadSession,
};

/// Drives chunked uploads: staging, completion, status and abort.
///
/// Per-upload ordering comes from the [`SessionRegistry`]. Chunk writes for
/// one upload run concurrently with each other; completion and abort are
/// serialised against them and against each other.
#[derive(Debug)]
pub struct UploadCoordinator {
    writer: ChunkWriter,
    merger: ChunkMerger,
    sessions: SessionRegistry,
    completeness: Completeness,
    split_piece_size: u64,
    handoff: Option<RemoteHandoff>,
}

impl UploadCoordinator {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            writer: ChunkWriter::new(&config.staging_root, config.upload_rules.clone()),
            merger: ChunkMerger::new(
                &config.staging_root,
                &config.media_root,
                config.artifact_extension.clone(),
            ),
            sessions: SessionRegistry::new(),
            completeness: config.completeness,
            split_piece_size: config.split_piece_size,
            handoff: None,
        }
    }

    /// Push every merged artifact to remote storage after completion.
    pub fn with_handoff(mut self, handoff: RemoteHandoff) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[instrument(skip(self, put), fields(index = put.index, total = put.total))]
    pub async fn accept_chunk(&self, file_name: &str, put: ChunkPut) -> BlobResult<ChunkReceipt> {
        let key = MediaKey::parse(file_name)?;
        self.writer.validate(&put)?;

        let ticket = self.sessions.begin_write(&key).await;
        let size = self.writer.write(&key, &put).await?;
        let session = ticket.record(put.index, put.total, size);

        Ok(ChunkReceipt {
            key,
            index: put.index,
            total: put.total,
            size_bytes: size,
            received: session.received.len() as u32,
        })
    }

    /// Stage a whole file as consecutive chunks of the configured piece
    /// size, ready for [`complete`](Self::complete).
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn split(
        &self,
        file_name: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> BlobResult<SplitUpload> {
        let key = MediaKey::parse(file_name)?;
        let plan = ChunkPlan::new(data.len() as u64, self.split_piece_size);
        let total = plan.count();
        if total == 0 {
            return Err(BlobError::invalid("File is empty."));
        }

        let ticket = self.sessions.begin_write(&key).await;
        for (index, range) in plan.pieces() {
            let piece = data.slice(range.start as usize..range.end as usize);
            let mut put = ChunkPut::new(index, total, piece).with_filename(key.as_str());
            if let Some(ct) = content_type {
                put = put.with_content_type(ct);
            }
            let size = self.writer.write(&key, &put).await?;
            ticket.record(index, total, size);
        }

        info!(chunks = total, "file split into staged chunks");
        Ok(SplitUpload {
            key,
            chunks: total,
            size_bytes: data.len() as u64,
        })
    }

    /// Merge the staged chunks of `file_name` and, when configured, hand the
    /// artifact to remote storage.
    ///
    /// A failed handoff leaves the local artifact in place and reports
    /// `UploadFailed`.
    #[instrument(skip(self))]
    pub async fn complete(&self, file_name: &str) -> BlobResult<MergedArtifact> {
        let key = MediaKey::parse(file_name)?;
        let ticket = self.sessions.begin_exclusive(&key).await?;
        let declared = ticket.session().map(|s| s.total_chunks);

        let mut artifact = match self.merger.merge(&key, self.completeness, declared).await {
            Ok(artifact) => {
                ticket.retire();
                artifact
            }
            Err(e) => {
                // the merge may have consumed some chunks before failing
                let left = self.staged_session(&key, declared).await.ok().flatten();
                ticket.replace_session(left);
                ticket.release();
                return Err(e);
            }
        };

        if let Some(handoff) = &self.handoff {
            let file_name = artifact
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(key.as_str())
                .to_string();
            let content_type = crate::mime::detect(&artifact.path, &[]);
            match handoff.push_file(&artifact.path, &file_name, Some(&content_type)).await {
                Ok(remote) => artifact.remote = Some(remote),
                Err(e) => {
                    warn!(path = %artifact.path.display(), error = %e, "remote handoff failed");
                    return Err(BlobError::upload_failed(format!(
                        "merged {} but remote upload failed: {e}",
                        artifact.path.display()
                    )));
                }
            }
        }

        Ok(artifact)
    }

    /// Progress of `file_name`. Falls back to the staging directory when the
    /// registry has no record, e.g. after a restart.
    pub async fn status(&self, file_name: &str) -> BlobResult<UploadSession> {
        let key = MediaKey::parse(file_name)?;
        if let Some(session) = self.sessions.get(&key) {
            return Ok(session);
        }

        self.staged_session(&key, None)
            .await?
            .ok_or_else(|| BlobError::not_found(format!("No chunks found for file: {key}")))
    }

    /// Session rebuilt from the chunks on disk; `None` if nothing is staged.
    async fn staged_session(
        &self,
        key: &MediaKey,
        declared: Option<u32>,
    ) -> BlobResult<Option<UploadSession>> {
        let staged = match self.merger.staged(key).await {
            Ok(staged) if !staged.is_empty() => staged,
            Ok(_) => return Ok(None),
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut session = UploadSession::new(key.clone(), 0);
        session.received = staged.iter().map(|(i, _)| *i).collect::<BTreeSet<_>>();
        let highest = session.received.iter().copied().max().unwrap_or_default();
        session.total_chunks = declared.unwrap_or(highest).max(highest);
        for (_, path) in &staged {
            session.received_bytes += tokio::fs::metadata(path).await?.len();
        }
        Ok(Some(session))
    }

    /// Drop every staged chunk of `file_name`.
    #[instrument(skip(self))]
    pub async fn abort(&self, file_name: &str) -> BlobResult<usize> {
        let key = MediaKey::parse(file_name)?;
        let ticket = self.sessions.begin_exclusive(&key).await?;
        match self.merger.discard(&key).await {
            Ok(removed) => {
                ticket.retire();
                info!(removed, "upload aborted");
                Ok(removed)
            }
            Err(e) => {
                ticket.release();
                Err(e)
            }
        }
    }
}

//! # reel-blob: ranged media delivery and chunked uploads
//!
//! `reel-blob` holds everything a media server does with bytes, without any
//! HTTP coupling:
//!
//! - **Range resolution**: turn a `Range` header into a satisfiable interval,
//!   falling back to the whole file or a leading window.
//! - **Partial-content delivery**: one pipeline, three policies (streamed,
//!   buffered, windowed), each with its own cap and early-EOF behaviour.
//! - **Chunked uploads**: validated, atomically staged chunks reassembled in
//!   numeric order, with per-upload serialisation of completion.
//! - **Remote handoff**: push finished media to multipart object storage.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reel_blob::prelude::*;
//!
//! # async fn demo() -> BlobResult<()> {
//! let media = MediaAdapter::new(MediaConfig::new("/srv/media"));
//!
//! media.upload_chunk("movie", ChunkPut::new(1, 2, vec![1u8; 1024])).await?;
//! media.upload_chunk("movie", ChunkPut::new(2, 2, vec![2u8; 512])).await?;
//! let artifact = media.complete_upload("movie").await?;
//! assert_eq!(artifact.size_bytes, 1536);
//!
//! let part = media
//!     .deliver("movie.mp4", Some("bytes=0-99"), &DeliveryPolicy::windowed())
//!     .await?;
//! assert_eq!(part.content_range().as_deref(), Some("bytes 0-99/1536"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! {staging_root}/{file_name}/chunk-{index}   while uploading
//! {media_root}/{file_name}.{ext}             after completion
//! ```

pub mod adapter;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod library;
pub mod memory_store;
pub mod merge;
pub mod mime;
pub mod range;
pub mod session;
pub mod store;
pub mod types;

#[cfg(feature = "s3")]
pub mod s3_store;

pub use adapter::MediaAdapter;
pub use chunk::{ChunkPlan, ChunkWriter};
pub use config::{Completeness, MediaConfig, UploadRules, DEFAULT_SPLIT_PIECE_BYTES};
pub use coordinator::UploadCoordinator;
pub use delivery::{
    BodyMode, DeliveryPolicy, EarlyEof, MediaHandle, MediaRead, PartialBody, PartialContent,
};
pub use error::{BlobError, BlobResult};
pub use library::MediaLibrary;
pub use memory_store::MemoryObjectStore;
pub use merge::ChunkMerger;
pub use range::{ByteInterval, RangeFallback, DEFAULT_WINDOW_BYTES};
pub use session::SessionRegistry;
pub use store::{MultipartObjectStore, PartTag, RemoteHandoff, UploadId, DEFAULT_PART_SIZE};
pub use types::{
    ByteStream, ChunkPut, ChunkReceipt, MediaKey, MergedArtifact, RemoteObject, SplitUpload,
    StoredMedia, UploadSession, UploadStatus,
};

#[cfg(feature = "s3")]
pub use s3_store::{S3MultipartStore, S3Settings};

pub mod prelude {
    pub use crate::{
        BlobError, BlobResult, ByteInterval, ChunkPut, Completeness, DeliveryPolicy, MediaAdapter,
        MediaConfig, MediaKey, MergedArtifact, MultipartObjectStore, PartialBody, PartialContent,
        RangeFallback, UploadRules,
    };
}

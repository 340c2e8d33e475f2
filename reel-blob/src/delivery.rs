//! Partial-content delivery.
//!
//! One pipeline serves every stream route. A [`DeliveryPolicy`] decides the
//! default interval, the transfer cap, the body shape and what happens when
//! the file ends before the promised byte count.

use std::io::SeekFrom;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};

use crate::range::{self, ByteInterval, RangeFallback, DEFAULT_WINDOW_BYTES};
use crate::{BlobResult, ByteStream};

/// Buffer size of the streaming-write strategy.
pub const STREAM_BUFFER_BYTES: usize = 8 * 1024;
/// Buffer size of the windowed strategy.
pub const WINDOW_BUFFER_BYTES: usize = 64 * 1024;

/// Seekable async source of media bytes.
pub trait MediaRead: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T> MediaRead for T where T: AsyncRead + AsyncSeek + Unpin + Send {}

/// An opened media source.
pub struct MediaHandle {
    pub name: String,
    pub total: u64,
    pub content_type: String,
    pub reader: Box<dyn MediaRead>,
}

impl MediaHandle {
    pub fn new<R>(name: impl Into<String>, total: u64, content_type: impl Into<String>, reader: R) -> Self
    where
        R: MediaRead + 'static,
    {
        Self {
            name: name.into(),
            total,
            content_type: content_type.into(),
            reader: Box::new(reader),
        }
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("name", &self.name)
            .field("total", &self.total)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Reaction to the file ending before the interval is fully read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyEof {
    /// End the body quietly; the client sees a short response.
    Truncate,
    /// Treat it as an I/O failure.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Read the whole interval before responding.
    Buffered,
    /// Emit fixed-size buffers as they are read.
    Streamed { buffer_size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub fallback: RangeFallback,
    pub transfer_cap: Option<u64>,
    pub on_early_eof: EarlyEof,
    pub body: BodyMode,
}

impl DeliveryPolicy {
    /// Full file by default, no cap, 8 KiB buffers, short reads truncate.
    pub fn streaming() -> Self {
        Self {
            fallback: RangeFallback::FullFile,
            transfer_cap: None,
            on_early_eof: EarlyEof::Truncate,
            body: BodyMode::Streamed {
                buffer_size: STREAM_BUFFER_BYTES,
            },
        }
    }

    /// Full file by default, at most 1 MiB read in one go, short reads fail.
    pub fn buffered() -> Self {
        Self {
            fallback: RangeFallback::FullFile,
            transfer_cap: Some(DEFAULT_WINDOW_BYTES),
            on_early_eof: EarlyEof::Fail,
            body: BodyMode::Buffered,
        }
    }

    /// First 1 MiB by default, at most 1 MiB per response, short reads fail.
    pub fn windowed() -> Self {
        Self {
            fallback: RangeFallback::Window(DEFAULT_WINDOW_BYTES),
            transfer_cap: Some(DEFAULT_WINDOW_BYTES),
            on_early_eof: EarlyEof::Fail,
            body: BodyMode::Streamed {
                buffer_size: WINDOW_BUFFER_BYTES,
            },
        }
    }

    pub fn with_transfer_cap(mut self, cap: Option<u64>) -> Self {
        self.transfer_cap = cap;
        self
    }

    pub fn with_fallback(mut self, fallback: RangeFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Interval actually sent for `raw` against a file of `total` bytes.
    pub fn interval_for(&self, raw: Option<&str>, total: u64) -> ByteInterval {
        let requested = range::resolve(raw, total, self.fallback);
        match self.transfer_cap {
            Some(cap) => requested.capped(cap),
            None => requested,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::streaming()
    }
}

pub enum PartialBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for PartialBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartialBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            PartialBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Headers and body of a ranged response, independent of any HTTP crate.
#[derive(Debug)]
pub struct PartialContent {
    pub interval: ByteInterval,
    pub content_type: String,
    pub body: PartialBody,
}

impl PartialContent {
    /// Partial (206) for any non-empty file, plain 200 for an empty one.
    pub fn is_partial(&self) -> bool {
        !self.interval.is_empty()
    }

    pub fn content_length(&self) -> u64 {
        self.interval.len()
    }

    pub fn content_range(&self) -> Option<String> {
        self.is_partial().then(|| self.interval.content_range())
    }

    /// Drain the body into memory.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self.body {
            PartialBody::Full(bytes) => Ok(bytes),
            PartialBody::Stream(mut stream) => {
                use futures_util::StreamExt;
                let mut out = Vec::with_capacity(self.interval.len() as usize);
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

/// Serve `raw` (a `Range` header value) from `handle` under `policy`.
///
/// Errors surface only before the body starts: a failed seek, or a short
/// read in buffered mode. Once streaming, failures follow `on_early_eof`.
pub async fn serve(
    handle: MediaHandle,
    raw: Option<&str>,
    policy: &DeliveryPolicy,
) -> BlobResult<PartialContent> {
    let interval = policy.interval_for(raw, handle.total);
    let MediaHandle {
        name,
        content_type,
        mut reader,
        ..
    } = handle;

    debug!(
        media = %name,
        range = raw.unwrap_or("-"),
        start = interval.start,
        end = interval.end,
        total = interval.total,
        "serving media"
    );

    if interval.is_empty() {
        return Ok(PartialContent {
            interval,
            content_type,
            body: PartialBody::Full(Bytes::new()),
        });
    }

    reader.seek(SeekFrom::Start(interval.start)).await?;

    let body = match policy.body {
        BodyMode::Buffered => {
            let mut buf = Vec::with_capacity(interval.len() as usize);
            (&mut reader).take(interval.len()).read_to_end(&mut buf).await?;
            if (buf.len() as u64) < interval.len() {
                let short = short_read(&name, interval, buf.len() as u64);
                match policy.on_early_eof {
                    EarlyEof::Fail => return Err(short.into()),
                    EarlyEof::Truncate if buf.is_empty() => return Err(short.into()),
                    EarlyEof::Truncate => {
                        warn!(media = %name, "{short}");
                        let interval = ByteInterval {
                            end: interval.start + buf.len() as u64 - 1,
                            ..interval
                        };
                        return Ok(PartialContent {
                            interval,
                            content_type,
                            body: PartialBody::Full(Bytes::from(buf)),
                        });
                    }
                }
            }
            PartialBody::Full(Bytes::from(buf))
        }
        BodyMode::Streamed { buffer_size } => PartialBody::Stream(stream_interval(
            name,
            reader,
            interval,
            buffer_size.max(1),
            policy.on_early_eof,
        )),
    };

    Ok(PartialContent {
        interval,
        content_type,
        body,
    })
}

fn short_read(name: &str, interval: ByteInterval, got: u64) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!(
            "{name}: expected {} bytes from offset {}, got {got}",
            interval.len(),
            interval.start
        ),
    )
}

fn stream_interval(
    name: String,
    mut reader: Box<dyn MediaRead>,
    interval: ByteInterval,
    buffer_size: usize,
    on_early_eof: EarlyEof,
) -> ByteStream {
    let stream = async_stream::stream! {
        let mut remaining = interval.len();
        let mut sent = 0u64;
        let mut buf = vec![0u8; buffer_size];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            match reader.read(&mut buf[..want]).await {
                Ok(0) => {
                    let err = short_read(&name, interval, sent);
                    match on_early_eof {
                        EarlyEof::Truncate => warn!(media = %name, "truncating body: {err}"),
                        EarlyEof::Fail => {
                            yield Err(err);
                        }
                    }
                    break;
                }
                Ok(n) => {
                    remaining -= n as u64;
                    sent += n as u64;
                    yield Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    match on_early_eof {
                        EarlyEof::Truncate => warn!(media = %name, error = %e, "read failed mid-transfer, truncating body"),
                        EarlyEof::Fail => {
                            yield Err(e);
                        }
                    }
                    break;
                }
            }
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn handle(data: Vec<u8>, declared: u64) -> MediaHandle {
        MediaHandle::new("movie.mp4", declared, "video/mp4", Cursor::new(data))
    }

    /// Reads normally up to `fail_at`, then every read errors.
    struct FailingReader {
        inner: Cursor<Vec<u8>>,
        fail_at: u64,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let pos = self.inner.position();
            if pos >= self.fail_at {
                return std::task::Poll::Ready(Err(std::io::Error::other("device went away")));
            }
            let end = self.fail_at.min(self.inner.get_ref().len() as u64) as usize;
            let available = &self.inner.get_ref()[pos as usize..end];
            let n = available.len().min(buf.remaining());
            buf.put_slice(&available[..n]);
            self.inner.set_position(pos + n as u64);
            std::task::Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for FailingReader {
        fn start_seek(mut self: std::pin::Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
            std::pin::Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<u64>> {
            std::pin::Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    fn failing_handle(data: Vec<u8>, fail_at: u64) -> MediaHandle {
        let total = data.len() as u64;
        let reader = FailingReader {
            inner: Cursor::new(data),
            fail_at,
        };
        MediaHandle::new("movie.mp4", total, "video/mp4", reader)
    }

    #[tokio::test]
    async fn streaming_serves_requested_range() {
        let data = bytes(10_000);
        let out = serve(handle(data.clone(), 10_000), Some("bytes=1000-1999"), &DeliveryPolicy::streaming())
            .await
            .unwrap();
        assert!(out.is_partial());
        assert_eq!(out.content_range().as_deref(), Some("bytes 1000-1999/10000"));
        assert_eq!(out.content_length(), 1000);
        let body = out.into_bytes().await.unwrap();
        assert_eq!(&body[..], &data[1000..2000]);
    }

    #[tokio::test]
    async fn streaming_defaults_to_full_file_uncapped() {
        let data = bytes(3 * 1024 * 1024);
        let out = serve(handle(data.clone(), data.len() as u64), None, &DeliveryPolicy::streaming())
            .await
            .unwrap();
        assert_eq!(out.content_length(), data.len() as u64);
        assert_eq!(out.into_bytes().await.unwrap().len(), data.len());
    }

    #[tokio::test]
    async fn windowed_defaults_to_first_mebibyte() {
        let data = bytes(5 * 1024 * 1024);
        let out = serve(handle(data.clone(), data.len() as u64), None, &DeliveryPolicy::windowed())
            .await
            .unwrap();
        assert!(out.is_partial());
        assert_eq!(out.content_range().as_deref(), Some("bytes 0-1048575/5242880"));
        let body = out.into_bytes().await.unwrap();
        assert_eq!(&body[..], &data[..1024 * 1024]);
    }

    #[tokio::test]
    async fn buffered_caps_open_ranges() {
        let data = bytes(4 * 1024 * 1024);
        let out = serve(handle(data.clone(), data.len() as u64), Some("bytes=10-"), &DeliveryPolicy::buffered())
            .await
            .unwrap();
        assert_eq!(out.interval.start, 10);
        assert_eq!(out.content_length(), DEFAULT_WINDOW_BYTES);
        assert!(matches!(out.body, PartialBody::Full(_)));
        let body = out.into_bytes().await.unwrap();
        assert_eq!(&body[..], &data[10..10 + DEFAULT_WINDOW_BYTES as usize]);
    }

    #[tokio::test]
    async fn unsatisfiable_range_serves_whole_small_file() {
        let data = bytes(100);
        let out = serve(handle(data.clone(), 100), Some("bytes=99999-100050"), &DeliveryPolicy::streaming())
            .await
            .unwrap();
        assert_eq!(out.content_range().as_deref(), Some("bytes 0-99/100"));
        assert_eq!(out.into_bytes().await.unwrap().to_vec(), data);
    }

    #[tokio::test]
    async fn streaming_truncates_silently_on_short_file() {
        // declared 1000 bytes, only 600 present
        let out = serve(handle(bytes(600), 1000), None, &DeliveryPolicy::streaming())
            .await
            .unwrap();
        assert_eq!(out.content_length(), 1000);
        let body = out.into_bytes().await.unwrap();
        assert_eq!(body.len(), 600);
    }

    #[tokio::test]
    async fn windowed_stream_errors_on_short_file() {
        let out = serve(handle(bytes(600), 1000), None, &DeliveryPolicy::windowed())
            .await
            .unwrap();
        let err = out.into_bytes().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn streaming_truncates_when_read_fails_mid_transfer() {
        let data = bytes(200_000);
        let out = serve(failing_handle(data.clone(), 70_000), None, &DeliveryPolicy::streaming())
            .await
            .unwrap();
        assert_eq!(out.content_length(), 200_000);
        let body = out.into_bytes().await.unwrap();
        assert_eq!(&body[..], &data[..70_000]);
    }

    #[tokio::test]
    async fn windowed_stream_surfaces_mid_transfer_read_error() {
        let out = serve(failing_handle(bytes(200_000), 70_000), None, &DeliveryPolicy::windowed())
            .await
            .unwrap();
        let err = out.into_bytes().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        assert!(err.to_string().contains("device went away"));
    }

    #[tokio::test]
    async fn buffered_short_read_is_an_io_failure() {
        let err = serve(handle(bytes(600), 1000), None, &DeliveryPolicy::buffered())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::BlobError::Io { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_not_partial() {
        let out = serve(handle(Vec::new(), 0), Some("bytes=0-10"), &DeliveryPolicy::windowed())
            .await
            .unwrap();
        assert!(!out.is_partial());
        assert_eq!(out.content_length(), 0);
        assert!(out.content_range().is_none());
        assert!(out.into_bytes().await.unwrap().is_empty());
    }
}

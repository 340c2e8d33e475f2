//! Byte-range resolution.
//!
//! Only the `bytes=<start>-<end>` and `bytes=<start>-` forms are honoured.
//! A header listing several ranges is reduced to its first one, and suffix
//! ranges (`bytes=-N`) are not understood. Anything that does not resolve to
//! a satisfiable interval falls back to a default instead of producing a 416.

use serde::{Deserialize, Serialize};

/// Default window served when a windowed route gets no usable range.
pub const DEFAULT_WINDOW_BYTES: u64 = 1024 * 1024;

/// Inclusive byte interval within a file of `total` bytes.
///
/// `start <= end < total`, except for an empty file where the interval is
/// empty (`start == end == 0`, `len() == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteInterval {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteInterval {
    /// Interval covering `[start, end]`, or `None` if it is not satisfiable.
    pub fn new(start: u64, end: u64, total: u64) -> Option<Self> {
        if start > end || end >= total {
            return None;
        }
        Some(Self { start, end, total })
    }

    pub fn empty() -> Self {
        Self {
            start: 0,
            end: 0,
            total: 0,
        }
    }

    /// Whole file.
    pub fn full(total: u64) -> Self {
        if total == 0 {
            return Self::empty();
        }
        Self {
            start: 0,
            end: total - 1,
            total,
        }
    }

    /// First `min(window, total)` bytes.
    pub fn window(total: u64, window: u64) -> Self {
        if total == 0 || window == 0 {
            return Self::empty();
        }
        Self {
            start: 0,
            end: window.min(total) - 1,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Shrink the interval so it spans at most `cap` bytes from `start`.
    pub fn capped(self, cap: u64) -> Self {
        if self.is_empty() || cap == 0 || self.len() <= cap {
            return self;
        }
        Self {
            end: self.start + cap - 1,
            ..self
        }
    }

    /// `Content-Range` value: `bytes {start}-{end}/{total}`.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// What to serve when the request carries no usable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeFallback {
    /// The whole file.
    #[default]
    FullFile,
    /// The first `n` bytes (or the whole file if shorter).
    Window(u64),
}

impl RangeFallback {
    pub fn interval(&self, total: u64) -> ByteInterval {
        match *self {
            RangeFallback::FullFile => ByteInterval::full(total),
            RangeFallback::Window(n) => ByteInterval::window(total, n),
        }
    }
}

/// Resolve a raw `Range` header against a file of `total` bytes.
///
/// The returned interval is what the client asked for, clamped to the file.
/// Transfer caps are applied later by the delivery policy.
pub fn resolve(raw: Option<&str>, total: u64, fallback: RangeFallback) -> ByteInterval {
    if total == 0 {
        return ByteInterval::empty();
    }
    raw.and_then(|header| parse_first(header, total))
        .unwrap_or_else(|| fallback.interval(total))
}

fn parse_first(header: &str, total: u64) -> Option<ByteInterval> {
    let ranges = header.trim().strip_prefix("bytes=")?;
    let first = ranges.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;

    let start = start.trim();
    if start.is_empty() {
        // suffix form, unsupported
        return None;
    }
    let start: u64 = start.parse().ok()?;
    if start >= total {
        return None;
    }

    let end = end.trim();
    let end = if end.is_empty() {
        total - 1
    } else {
        end.parse::<u64>().ok()?
    };
    if end < start {
        return None;
    }

    ByteInterval::new(start, end.min(total - 1), total)
}

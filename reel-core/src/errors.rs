//! # Errors
//!
//! Structured errors shared by every reel crate. A `ReelError` carries an
//! [`ErrorKind`] (which fixes the HTTP status) and a client-facing message,
//! and can travel inside `anyhow::Error` through handler code until the
//! transport decides how to render it.
//!
//! The three outcomes the media pipeline distinguishes map onto kinds:
//!
//! | outcome        | kind           | status |
//! |----------------|----------------|--------|
//! | missing media  | `NotFound`     | 404    |
//! | bad input      | `BadRequest`   | 400    |
//! | I/O failure    | `GeneralError` | 500    |

use std::fmt;

use anyhow::Error as AnyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,      // 400
    NotFound,        // 404
    PayloadTooLarge, // 413
    GeneralError,    // 500
    Unavailable,     // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::GeneralError => 500,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::Unavailable => "Unavailable",
        }
    }
}

/// A structured error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct ReelError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<AnyError>,
}

impl ReelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&ReelError> {
        err.chain().find_map(|e| e.downcast_ref::<ReelError>())
    }

    /// Turn any error into a `ReelError`, keeping an existing one as is and
    /// wrapping anything else as `GeneralError`.
    pub fn normalize(err: AnyError) -> ReelError {
        match err.downcast::<ReelError>() {
            Ok(reel) => reel,
            Err(other) => {
                ReelError::new(ErrorKind::GeneralError, other.to_string()).with_source(other)
            }
        }
    }

    /// Copy without the inner source, suitable for returning to clients.
    /// Internal failures also lose their message.
    pub fn sanitize_for_client(&self) -> ReelError {
        let message = match self.kind {
            ErrorKind::GeneralError => "Internal server error".to_string(),
            _ => self.message.clone(),
        };
        ReelError {
            kind: self.kind,
            message,
            source: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for ReelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for ReelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_existing_reel_error() {
        let err = ReelError::not_found("missing.mp4").into_anyhow();
        let reel = ReelError::normalize(err);
        assert_eq!(reel.kind, ErrorKind::NotFound);
        assert_eq!(reel.message, "missing.mp4");
    }

    #[test]
    fn normalize_wraps_foreign_errors_as_general() {
        let reel = ReelError::normalize(anyhow::anyhow!("disk on fire"));
        assert_eq!(reel.code(), 500);
        assert!(reel.source.is_some());
    }

    #[test]
    fn sanitize_hides_internal_messages_only() {
        let internal = ReelError::general_error("/srv/media/secret path").sanitize_for_client();
        assert_eq!(internal.message, "Internal server error");

        let bad = ReelError::bad_request("Chunk 3 is empty.").sanitize_for_client();
        assert_eq!(bad.message, "Chunk 3 is empty.");
        assert!(bad.source.is_none());
    }

    #[test]
    fn from_anyhow_searches_context_chain() {
        let err = ReelError::bad_request("nope").into_anyhow().context("while uploading");
        let found = ReelError::from_anyhow(&err).map(|e| e.kind);
        assert_eq!(found, Some(ErrorKind::BadRequest));
    }

    #[test]
    fn normalize_sees_through_context() {
        let err = ReelError::payload_too_large("Chunk too big")
            .into_anyhow()
            .context("reading multipart");
        let reel = ReelError::normalize(err);
        assert_eq!(reel.code(), 413);
        assert_eq!(reel.message, "Chunk too big");
    }

    #[test]
    fn source_is_exposed_through_error_trait() {
        use std::error::Error as _;
        let reel = ReelError::general_error("merge failed").with_source(anyhow::anyhow!("disk full"));
        assert_eq!(reel.source().map(|e| e.to_string()).as_deref(), Some("disk full"));
    }
}

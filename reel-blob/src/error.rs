use thiserror::Error;

/// Result type for media operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors raised by delivery, staging, merging and remote handoff.
///
/// Transports map these onto their own status codes: `NotFound` and
/// `Invalid` are caller problems, everything else is a server failure.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Not found: {id}")]
    NotFound { id: String },

    #[error("{message}")]
    Invalid { message: String },

    #[error("Operation not supported: {what}")]
    Unsupported { what: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn unsupported<S: Into<String>>(what: S) -> Self {
        Self::Unsupported { what: what.into() }
    }

    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }
}

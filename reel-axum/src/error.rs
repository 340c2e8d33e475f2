use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reel_blob::BlobError;
use reel_core::errors::{ErrorKind, ReelError};
use tracing::error;

/// Handler error: anything `anyhow` can carry, rendered as a plain-text
/// message with the status of the `ReelError` or `BlobError` inside it.
#[derive(Debug)]
pub struct ReelAxumError(pub anyhow::Error);

impl From<anyhow::Error> for ReelAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<ReelError> for ReelAxumError {
    fn from(e: ReelError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<BlobError> for ReelAxumError {
    fn from(e: BlobError) -> Self {
        Self(anyhow::Error::new(e))
    }
}

/// Status and client message for a media-layer error.
pub fn reel_error_for(err: &BlobError) -> ReelError {
    match err {
        BlobError::NotFound { id } => ReelError::not_found(id.clone()),
        BlobError::Invalid { message } => ReelError::bad_request(message.clone()),
        BlobError::Unsupported { what } => ReelError::unavailable(what.clone()),
        other => ReelError::general_error(other.to_string()),
    }
}

/// Find the `ReelError` or `BlobError` carried by `err`. Anything else is
/// an internal failure; the original error stays attached as the source.
fn resolve(err: anyhow::Error) -> ReelError {
    let has_reel = ReelError::from_anyhow(&err).is_some();
    let mapped = err
        .chain()
        .find_map(|e| e.downcast_ref::<BlobError>())
        .map(reel_error_for);
    match mapped {
        Some(mapped) if !has_reel => mapped.with_source(err),
        _ => ReelError::normalize(err),
    }
}

impl IntoResponse for ReelAxumError {
    fn into_response(self) -> Response {
        let reel = resolve(self.0);
        if reel.kind == ErrorKind::GeneralError {
            error!(error = %reel.message, source = ?reel.source, "request failed");
        }
        let safe = reel.sanitize_for_client();
        let status =
            StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, safe.message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ReelAxumError) -> u16 {
        err.into_response().status().as_u16()
    }

    #[test]
    fn blob_errors_map_to_http_statuses() {
        assert_eq!(status_of(BlobError::not_found("x").into()), 404);
        assert_eq!(status_of(BlobError::invalid("Chunk 1 is empty.").into()), 400);
        assert_eq!(status_of(BlobError::unsupported("remote").into()), 503);
        assert_eq!(status_of(BlobError::upload_failed("boom").into()), 500);
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        assert_eq!(status_of(BlobError::from(io).into()), 500);
    }

    #[test]
    fn reel_errors_survive_context() {
        let err = anyhow::Error::new(BlobError::invalid("bad")).context("uploading chunk");
        assert_eq!(status_of(err.into()), 400);

        let reel = ReelError::payload_too_large("too big").into_anyhow().context("parsing");
        assert_eq!(status_of(reel.into()), 413);
    }

    #[test]
    fn unknown_errors_are_internal() {
        assert_eq!(status_of(anyhow::anyhow!("boom").into()), 500);
    }

    #[test]
    fn resolved_blob_errors_keep_their_source() {
        let reel = resolve(anyhow::Error::new(BlobError::upload_failed("part 2 rejected")));
        assert_eq!(reel.kind, ErrorKind::GeneralError);
        assert!(reel.source.is_some());
        assert_eq!(reel.sanitize_for_client().message, "Internal server error");
    }
}

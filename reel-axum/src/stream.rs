use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use reel_blob::{DeliveryPolicy, PartialBody, PartialContent};
use serde::Deserialize;

use crate::{MediaState, ReelAxumError};

#[derive(Debug, Deserialize)]
pub struct FileNameQuery {
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// `/stream` routes. Missing media answers 404 with an empty body.
pub fn stream_router() -> Router<MediaState> {
    Router::new()
        .route("/", get(stream_file))
        .route("/buffered", get(stream_buffered))
        .route("/region/{video_name}", get(stream_region))
}

async fn stream_file(
    State(state): State<MediaState>,
    Query(query): Query<FileNameQuery>,
    headers: HeaderMap,
) -> Response {
    deliver(&state, &query.file_name, &headers, &state.policies.streaming).await
}

async fn stream_buffered(
    State(state): State<MediaState>,
    Query(query): Query<FileNameQuery>,
    headers: HeaderMap,
) -> Response {
    deliver(&state, &query.file_name, &headers, &state.policies.buffered).await
}

async fn stream_region(
    State(state): State<MediaState>,
    Path(video_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    deliver(&state, &video_name, &headers, &state.policies.windowed).await
}

async fn deliver(
    state: &MediaState,
    name: &str,
    headers: &HeaderMap,
    policy: &DeliveryPolicy,
) -> Response {
    let range = headers.get(RANGE).and_then(|v| v.to_str().ok());
    match state.media.deliver(name, range, policy).await {
        Ok(content) => partial_response(content),
        Err(e) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
        Err(e) => ReelAxumError::from(e).into_response(),
    }
}

/// 206 with `Content-Range` for non-empty media, 200 for an empty file.
pub fn partial_response(content: PartialContent) -> Response {
    let status = if content.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content.content_type.as_str())
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_LENGTH, content.content_length());
    if let Some(range) = content.content_range() {
        builder = builder.header(CONTENT_RANGE, range);
    }

    let body = match content.body {
        PartialBody::Full(bytes) => Body::from(bytes),
        PartialBody::Stream(stream) => Body::from_stream(stream),
    };

    match builder.body(body) {
        Ok(response) => response,
        Err(e) => ReelAxumError(anyhow::Error::new(e)).into_response(),
    }
}

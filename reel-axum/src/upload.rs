use axum::{
    body::Body,
    extract::{rejection::FormRejection, Form, Query, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use reel_blob::{ChunkPut, UploadStatus};
use reel_core::errors::ReelError;
use serde::Deserialize;
use tracing::info;

use crate::multipart::read_multipart;
use crate::{MediaState, ReelAxumError};

type HandlerResult<T> = Result<T, ReelAxumError>;

#[derive(Debug, Default, Deserialize)]
pub struct FileNameParams {
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}

/// `/upload` routes.
pub fn upload_router() -> Router<MediaState> {
    Router::new()
        .route("/", delete(abort_upload))
        .route("/chunk", post(upload_chunk))
        .route("/complete", post(complete_upload))
        .route("/status", get(upload_status))
        .route("/split", post(upload_split))
        .route("/video", post(upload_video))
        .route("/remote", post(upload_remote))
}

/// Multipart fields `file`, `chunkIndex`, `totalChunks`, `fileName`.
async fn upload_chunk(
    State(state): State<MediaState>,
    headers: HeaderMap,
    body: Body,
) -> HandlerResult<String> {
    let mut form = read_multipart(&headers, body, &state.multipart).await?;
    let index: u32 = form.number("chunkIndex")?;
    let total: u32 = form.number("totalChunks")?;
    let file_name = form.text("fileName")?.to_string();
    let file = form.take_file("file")?;

    let mut put = ChunkPut::new(index, total, file.data);
    if let Some(ct) = file.content_type {
        put = put.with_content_type(ct);
    }
    if let Some(name) = file.filename {
        put = put.with_filename(name);
    }

    let receipt = state.media.upload_chunk(&file_name, put).await?;
    Ok(receipt.message())
}

/// `fileName` from the query string or an urlencoded form body.
async fn complete_upload(
    State(state): State<MediaState>,
    Query(query): Query<FileNameParams>,
    form: Result<Form<FileNameParams>, FormRejection>,
) -> HandlerResult<String> {
    let file_name = query
        .file_name
        .or_else(|| form.ok().and_then(|Form(f)| f.file_name))
        .ok_or_else(|| ReelError::bad_request("Missing field: fileName"))?;

    let artifact = state.media.complete_upload(&file_name).await?;
    info!(file = %file_name, size = artifact.size_bytes, "upload completed");
    Ok(artifact.message())
}

async fn upload_status(
    State(state): State<MediaState>,
    Query(query): Query<FileNameParams>,
) -> HandlerResult<Json<UploadStatus>> {
    let file_name = query
        .file_name
        .ok_or_else(|| ReelError::bad_request("Missing field: fileName"))?;
    let session = state.media.upload_status(&file_name).await?;
    Ok(Json(UploadStatus::from(&session)))
}

async fn abort_upload(
    State(state): State<MediaState>,
    Query(query): Query<FileNameParams>,
) -> HandlerResult<String> {
    let file_name = query
        .file_name
        .ok_or_else(|| ReelError::bad_request("Missing field: fileName"))?;
    let removed = state.media.abort_upload(&file_name).await?;
    Ok(format!("Upload {file_name} aborted, {removed} chunk(s) removed."))
}

/// Whole file in multipart field `file`, staged as chunks for a later
/// `/upload/complete`. The upload is keyed by the `fileName` field, or the
/// file's own name when that is absent.
async fn upload_split(
    State(state): State<MediaState>,
    headers: HeaderMap,
    body: Body,
) -> HandlerResult<String> {
    let mut form = read_multipart(&headers, body, &state.multipart).await?;
    let file = form.take_file("file")?;
    let file_name = form
        .text("fileName")
        .ok()
        .map(str::to_string)
        .or_else(|| file.filename.clone())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ReelError::bad_request("Invalid file name."))?;

    let split = state
        .media
        .split_upload(&file_name, file.data, file.content_type.as_deref())
        .await?;
    info!(file = %file_name, chunks = split.chunks, "upload split into chunks");
    Ok(split.message())
}

/// Single-shot upload of a whole file, multipart field `file`.
async fn upload_video(
    State(state): State<MediaState>,
    headers: HeaderMap,
    body: Body,
) -> HandlerResult<String> {
    let mut form = read_multipart(&headers, body, &state.multipart).await?;
    let file = form.take_file("file")?;
    let stored = state
        .media
        .store_file(file.data, file.content_type.as_deref(), file.filename.as_deref())
        .await?;
    Ok(stored.message())
}

/// Whole file straight to remote object storage, multipart field `file`.
async fn upload_remote(
    State(state): State<MediaState>,
    headers: HeaderMap,
    body: Body,
) -> HandlerResult<String> {
    if !state.media.has_remote() {
        return Err(ReelError::unavailable("Remote storage is not configured").into());
    }
    let mut form = read_multipart(&headers, body, &state.multipart).await?;
    let file = form.take_file("file")?;
    let name = file
        .filename
        .clone()
        .ok_or_else(|| ReelError::bad_request("File name is required"))?;
    let object = state
        .media
        .push_remote(&name, file.content_type.as_deref(), file.data)
        .await?;
    Ok(format!(
        "File uploaded successfully to remote storage: {} ({} part(s))",
        object.key, object.parts
    ))
}

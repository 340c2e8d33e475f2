//! Multipart form parsing with multer.
//!
//! Text fields are collected as strings and file fields as in-memory bytes.
//! Size limits are enforced while the body streams in, so an oversized
//! request is rejected before it is fully read.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use bytes::Bytes;
use reel_core::errors::ReelError;
use tracing::debug;

/// Limits for one multipart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Largest single field
    pub max_field_bytes: u64,
    /// Largest whole request body
    pub max_total_bytes: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_field_bytes: 64 * 1024 * 1024,
            max_total_bytes: 65 * 1024 * 1024,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_field_bytes(mut self, size: u64) -> Self {
        self.max_field_bytes = size;
        self
    }

    pub fn max_total_bytes(mut self, size: u64) -> Self {
        self.max_total_bytes = size;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, FilePart>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Result<&str, ReelError> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .ok_or_else(|| ReelError::bad_request(format!("Missing field: {name}")))
    }

    pub fn number<T: std::str::FromStr>(&self, name: &str) -> Result<T, ReelError> {
        let raw = self.text(name)?;
        raw.parse()
            .map_err(|_| ReelError::bad_request(format!("Field {name} must be a number, got '{raw}'")))
    }

    pub fn take_file(&mut self, name: &str) -> Result<FilePart, ReelError> {
        self.files
            .remove(name)
            .ok_or_else(|| ReelError::bad_request(format!("Missing file field: {name}")))
    }
}

/// Read a `multipart/form-data` body.
pub async fn read_multipart(
    headers: &HeaderMap,
    body: Body,
    config: &MultipartConfig,
) -> Result<MultipartForm, ReelError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| ReelError::bad_request("Expected a multipart/form-data request"))?;

    let constraints = multer::Constraints::new().size_limit(
        multer::SizeLimit::new()
            .whole_stream(config.max_total_bytes)
            .per_field(config.max_field_bytes),
    );
    let mut multipart =
        multer::Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());

        if filename.is_some() {
            let data = field.bytes().await.map_err(multipart_error)?;
            debug!(field = %name, size = data.len(), "file field");
            form.files.insert(
                name,
                FilePart {
                    filename,
                    content_type,
                    data,
                },
            );
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn multipart_error(err: multer::Error) -> ReelError {
    match err {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            ReelError::payload_too_large(format!("Request too large: {err}"))
        }
        other => ReelError::bad_request(format!("Failed to parse multipart data: {other}")),
    }
}

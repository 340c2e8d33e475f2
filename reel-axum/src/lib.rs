//! reel-axum: Axum adapter for reel media.
//!
//! Mounts the stream and upload routes over a [`reel_blob::MediaAdapter`]
//! and renders media errors as HTTP responses.

pub mod app;
pub mod multipart;
pub mod state;
pub mod stream;
pub mod upload;
mod error;

pub use error::{reel_error_for, ReelAxumError};
pub use state::{MediaState, StreamPolicies};

pub use app::{axum, cors_layer, AxumApp};

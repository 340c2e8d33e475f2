//! reel-server: wires configuration, storage and the HTTP surface together.

pub mod config;

use std::sync::Arc;

use reel_axum::{AxumApp, MediaState};
use reel_blob::{MediaAdapter, MultipartObjectStore};
use tracing::info;

pub use config::{apply_defaults, defaults, Settings, ENV_PREFIX};

pub const DEFAULT_LOG_FILTER: &str =
    "reel_server=info,reel_axum=info,reel_blob=info,tower_http=info";

/// Build the app with no remote store attached.
pub fn build(settings: &Settings) -> AxumApp {
    build_with_remote(settings, None)
}

/// Build the app, optionally handing completed uploads to `remote`.
pub fn build_with_remote(
    settings: &Settings,
    remote: Option<Arc<dyn MultipartObjectStore>>,
) -> AxumApp {
    let mut media = MediaAdapter::new(settings.media.clone());
    match remote {
        Some(store) => {
            info!(prefix = %settings.media.remote_key_prefix, "remote handoff enabled");
            media = media.with_remote(store);
        }
        None => info!("remote handoff disabled"),
    }

    info!(
        media_root = %settings.media.media_root.display(),
        staging_root = %settings.media.staging_root.display(),
        "media storage ready"
    );
    let state = MediaState::new(media).with_policies(settings.policies);
    AxumApp::with_origins(state, &settings.cors_origins)
}

/// Connect the configured bucket, if any.
#[cfg(feature = "s3")]
pub async fn connect_remote(
    settings: &Settings,
) -> anyhow::Result<Option<Arc<dyn MultipartObjectStore>>> {
    use reel_blob::{S3MultipartStore, S3Settings};

    let Some(bucket) = settings.remote_bucket.as_deref() else {
        return Ok(None);
    };
    let s3 = S3Settings::for_bucket_from_env(bucket);
    info!(bucket, "connecting remote store");
    let store = S3MultipartStore::connect(s3).await;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "s3"))]
pub async fn connect_remote(
    settings: &Settings,
) -> anyhow::Result<Option<Arc<dyn MultipartObjectStore>>> {
    if settings.remote_bucket.is_some() {
        tracing::warn!("remote.bucket is set but the s3 feature is not compiled in");
    }
    Ok(None)
}

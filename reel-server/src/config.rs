use std::path::PathBuf;

use reel_axum::StreamPolicies;
use reel_blob::{Completeness, DeliveryPolicy, MediaConfig, RangeFallback, UploadRules};
use reel_core::{ReelConfig, ReelConfigSnapshot};

pub const ENV_PREFIX: &str = "REEL__";

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Server settings resolved from a [`ReelConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub media: MediaConfig,
    pub policies: StreamPolicies,
    /// Allowed CORS origins; empty or `*` allows any
    pub cors_origins: Vec<String>,
    /// Bucket for remote handoff; none disables it
    pub remote_bucket: Option<String>,
}

impl Settings {
    /// `REEL__*` environment variables over the built-in defaults.
    pub fn from_env() -> Self {
        let mut config = ReelConfig::new();
        config.load_env(ENV_PREFIX);
        apply_defaults(&mut config);
        Self::from_config(&config)
    }

    pub fn from_config(config: &ReelConfig) -> Self {
        let snap = config.snapshot();
        let media_root = PathBuf::from(snap.get("media.root").unwrap_or("media"));
        let staging_root = snap
            .get("media.staging")
            .map(PathBuf::from)
            .unwrap_or_else(|| media_root.join(".staging"));

        let mut rules = UploadRules::default();
        if let Some(bytes) = scaled(&snap, "upload.max_chunk_mb", MIB) {
            rules = rules.with_max_chunk_bytes(bytes);
        }
        if let Some(bytes) = scaled(&snap, "upload.max_file_mb", MIB) {
            rules = rules.with_max_file_bytes(bytes);
        }
        rules = rules
            .with_allowed_content_types(snap.get_list("upload.allowed_types"))
            .with_allowed_extensions(snap.get_list("upload.allowed_extensions"));

        let completeness = if snap.get_bool("upload.require_contiguous").unwrap_or(false) {
            Completeness::Contiguous
        } else {
            Completeness::AsStaged
        };

        let mut media = MediaConfig::new(media_root)
            .with_staging_root(staging_root)
            .with_upload_rules(rules)
            .with_completeness(completeness);
        if let Some(ext) = snap.get("media.extension") {
            media = media.with_artifact_extension(ext);
        }
        if let Some(size) = remote_part_size(&snap) {
            media = media.with_remote_part_size(size);
        }
        if let Some(prefix) = snap.get("remote.prefix") {
            media = media.with_remote_key_prefix(prefix);
        }
        if let Some(bytes) = scaled(&snap, "upload.split_kb", KIB) {
            media = media.with_split_piece_size(bytes);
        }

        Self {
            host: snap.get_string("http.host").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: snap.get_u16("http.port").unwrap_or(3030),
            media,
            policies: stream_policies(&snap),
            cors_origins: snap.get_list("http.cors_origins"),
            remote_bucket: snap.get_string("remote.bucket").filter(|b| !b.is_empty()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `key` times `unit`; values that do not parse or overflow are ignored.
fn scaled(snap: &ReelConfigSnapshot, key: &str, unit: u64) -> Option<u64> {
    snap.get_u64(key).and_then(|n| n.checked_mul(unit))
}

/// Parts below 5 MiB are refused by S3 for all but the last part.
fn remote_part_size(snap: &ReelConfigSnapshot) -> Option<usize> {
    snap.get_u64("remote.part_mb")
        .map(|mb| mb.max(5))
        .and_then(|mb| mb.checked_mul(MIB))
        .and_then(|bytes| usize::try_from(bytes).ok())
}

/// The buffered and windowed routes share one window: the default interval
/// of the region route and the cap of both.
fn stream_policies(snap: &ReelConfigSnapshot) -> StreamPolicies {
    let mut policies = StreamPolicies::default();
    if let Some(window) = scaled(snap, "stream.window_kb", KIB).filter(|w| *w > 0) {
        policies.buffered = DeliveryPolicy::buffered().with_transfer_cap(Some(window));
        policies.windowed = DeliveryPolicy::windowed()
            .with_fallback(RangeFallback::Window(window))
            .with_transfer_cap(Some(window));
    }
    policies
}

pub fn apply_defaults(config: &mut ReelConfig) {
    config.set_default("http.host", "127.0.0.1");
    config.set_default("http.port", "3030");
    config.set_default("http.cors_origins", "*");
    config.set_default("media.root", "media");
    config.set_default("media.extension", "mp4");
}

pub fn defaults() -> ReelConfig {
    let mut config = ReelConfig::new();
    apply_defaults(&mut config);
    config
}

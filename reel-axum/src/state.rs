use std::sync::Arc;

use reel_blob::{DeliveryPolicy, MediaAdapter};

use crate::multipart::MultipartConfig;

/// Shared state of the media routes.
#[derive(Clone)]
pub struct MediaState {
    pub media: Arc<MediaAdapter>,
    pub policies: StreamPolicies,
    pub multipart: MultipartConfig,
}

/// Delivery policy per stream route.
#[derive(Debug, Clone, Copy)]
pub struct StreamPolicies {
    /// `GET /stream`
    pub streaming: DeliveryPolicy,
    /// `GET /stream/buffered`
    pub buffered: DeliveryPolicy,
    /// `GET /stream/region/{videoName}`
    pub windowed: DeliveryPolicy,
}

impl Default for StreamPolicies {
    fn default() -> Self {
        Self {
            streaming: DeliveryPolicy::streaming(),
            buffered: DeliveryPolicy::buffered(),
            windowed: DeliveryPolicy::windowed(),
        }
    }
}

impl MediaState {
    /// Multipart limits leave room above the upload rules so oversized
    /// chunks reach validation and get its message.
    pub fn new(media: MediaAdapter) -> Self {
        let rules = &media.config().upload_rules;
        let largest = rules.max_chunk_bytes.max(rules.max_file_bytes);
        let slack = 1024 * 1024;
        Self {
            multipart: MultipartConfig::new()
                .max_field_bytes(largest + slack)
                .max_total_bytes(largest + 2 * slack),
            policies: StreamPolicies::default(),
            media: Arc::new(media),
        }
    }

    pub fn with_policies(mut self, policies: StreamPolicies) -> Self {
        self.policies = policies;
        self
    }
}

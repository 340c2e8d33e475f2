use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::store::{MultipartObjectStore, PartTag, UploadId};
use crate::{BlobError, BlobResult};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style addressing, needed by most self-hosted S3 servers
    pub force_path_style: bool,
}

impl S3Settings {
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }

    /// `S3_BUCKET` (required), `S3_REGION`, `S3_ENDPOINT_URL`,
    /// `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY`.
    pub fn from_env() -> BlobResult<Self> {
        let bucket = env::var("S3_BUCKET")
            .map_err(|_| BlobError::invalid("S3_BUCKET environment variable required"))?;
        Ok(Self::for_bucket_from_env(bucket))
    }

    /// Same as [`from_env`](Self::from_env) with the bucket supplied.
    pub fn for_bucket_from_env<S: Into<String>>(bucket: S) -> Self {
        let endpoint_url = env::var("S3_ENDPOINT_URL").ok();
        Self {
            bucket: bucket.into(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            force_path_style: endpoint_url.is_some(),
            endpoint_url,
            access_key_id: env::var("S3_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("S3_SECRET_ACCESS_KEY").ok(),
        }
    }
}

/// [`MultipartObjectStore`] backed by S3 multipart uploads.
#[derive(Debug, Clone)]
pub struct S3MultipartStore {
    client: Client,
    bucket: String,
    keys: std::sync::Arc<DashMap<String, String>>,
}

impl S3MultipartStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            keys: Default::default(),
        }
    }

    pub async fn connect(settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(id), Some(secret)) = (settings.access_key_id.clone(), settings.secret_access_key.clone()) {
            loader = loader.credentials_provider(Credentials::new(id, secret, None, None, "reel"));
        }
        if let Some(endpoint) = settings.endpoint_url.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(settings.force_path_style)
                .build(),
        );
        Self::new(client, settings.bucket)
    }

    fn key_for(&self, upload_id: &UploadId) -> BlobResult<String> {
        self.keys
            .get(upload_id.as_str())
            .map(|k| k.clone())
            .ok_or_else(|| BlobError::not_found(upload_id.as_str()))
    }
}

#[async_trait]
impl MultipartObjectStore for S3MultipartStore {
    async fn create_upload(&self, key: &str, content_type: Option<&str>) -> BlobResult<UploadId> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(BlobError::backend)?;
        let id = out
            .upload_id()
            .ok_or_else(|| BlobError::upload_failed("S3 returned no upload id"))?
            .to_string();
        self.keys.insert(id.clone(), key.to_string());
        debug!(key, upload_id = %id, "created multipart upload");
        Ok(UploadId(id))
    }

    async fn upload_part(&self, upload_id: &UploadId, part_number: i32, data: Bytes) -> BlobResult<PartTag> {
        let key = self.key_for(upload_id)?;
        let out = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .part_number(part_number)
            .body(AwsByteStream::from(data))
            .send()
            .await
            .map_err(BlobError::backend)?;
        Ok(PartTag {
            part_number,
            etag: out.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_upload(&self, upload_id: &UploadId, parts: Vec<PartTag>) -> BlobResult<()> {
        let key = self.key_for(upload_id)?;
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .into_iter()
                    .map(|p| {
                        CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .multipart_upload(completed)
            .send()
            .await
            .map_err(BlobError::backend)?;
        self.keys.remove(upload_id.as_str());
        Ok(())
    }

    async fn abort_upload(&self, upload_id: &UploadId) -> BlobResult<()> {
        let key = self.key_for(upload_id)?;
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(BlobError::backend)?;
        self.keys.remove(upload_id.as_str());
        Ok(())
    }
}

//! Object storage for archived records
//!
//! [`ObjectStore`] is the capability the archiver writes through;
//! [`S3Store`] implements it against any S3-compatible endpoint.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use crate::error::StoreError;

pub mod config;

/// Write-only view of a bucketed object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any existing object
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult, StoreError>;
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: config::StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "forumpipe-archive",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "Storage client initialized");

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, bytes))]
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult, StoreError> {
        let checksum = calculate_sha256(&bytes);
        let size = bytes.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to upload to S3: {}", e)))?;

        debug!("Uploaded s3://{}/{}", bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    /// Hex-encoded SHA-256 of the written bytes
    pub checksum: String,
    pub size: i64,
}

pub fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

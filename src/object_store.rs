//! Object storage backend for the catalog artifact.
//!
//! The catalog is one JSON object at a fixed key; uploads overwrite any prior
//! version (last writer wins). The trait seam exists so the publisher and the
//! reader API can be exercised against a mock store.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from the object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to upload object {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Failed to download object {key}: {message}")]
    Download { key: String, message: String },
}

/// Durable key/value object storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing version
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Read an object in full
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// S3-compatible store holding the published catalog
pub struct S3CatalogStore {
    client: S3Client,
    bucket: String,
}

impl S3CatalogStore {
    /// Create a new store from configuration
    pub async fn new(config: &StorageConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Custom endpoint for S3-compatible stores (Supabase, MinIO, ...)
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Catalog object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3CatalogStore {
    #[instrument(skip(self, bytes), fields(key = %key, size_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!("Object uploaded");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Download {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Download {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(body.into_bytes().to_vec())
    }
}

//! [`BlobStore`] over the `object_store` crate.
//!
//! Any `object_store` backend works; [`ObjectStoreBlobStore::from_s3`] builds
//! the S3 one used in production, with credentials taken from the standard
//! `AWS_*` environment.

use crate::traits::{
    BlobStore, Connector, ConnectorError, ConnectorHealth, ConnectorResult, ObjectProbe,
};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Object storage adapter.
pub struct ObjectStoreBlobStore {
    name: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobStore {
    pub fn new(name: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }

    /// Builds an S3-backed store for `bucket`.
    pub fn from_s3(bucket: &str, region: &str, endpoint: Option<&str>) -> ConnectorResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region);
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder
            .build()
            .map_err(|e| ConnectorError::ConfigError(format!("S3 store: {}", e)))?;
        info!(bucket, region, "S3 blob store initialized");
        Ok(Self::new(bucket, Arc::new(store)))
    }

    fn path(key: &str) -> ConnectorResult<Path> {
        Path::parse(key)
            .map_err(|e| ConnectorError::RequestFailed(format!("Invalid object key '{}': {}", key, e)))
    }
}

fn storage_error(key: &str, e: object_store::Error) -> ConnectorError {
    match e {
        object_store::Error::NotFound { .. } => ConnectorError::NotFound(key.to_string()),
        other => ConnectorError::RequestFailed(other.to_string()),
    }
}

#[async_trait]
impl Connector for ObjectStoreBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "storage"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        // An absent probe object still proves the bucket answers.
        match self.head(".health").await {
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    #[instrument(skip(self))]
    async fn head(&self, key: &str) -> ConnectorResult<ObjectProbe> {
        match self.store.head(&Self::path(key)?).await {
            Ok(_) => Ok(ObjectProbe::Exists),
            Err(object_store::Error::NotFound { .. }) => Ok(ObjectProbe::NotFound),
            Err(e) => Err(storage_error(key, e)),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> ConnectorResult<Bytes> {
        let result = self
            .store
            .get(&Self::path(key)?)
            .await
            .map_err(|e| storage_error(key, e))?;
        let body = result.bytes().await.map_err(|e| storage_error(key, e))?;
        debug!(size = body.len(), "Fetched object");
        Ok(body)
    }

    #[instrument(skip(self, body))]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> ConnectorResult<()> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&Self::path(key)?, PutPayload::from(body), options)
            .await
            .map_err(|e| storage_error(key, e))?;
        Ok(())
    }
}

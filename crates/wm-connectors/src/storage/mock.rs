//! Mock blob store for testing.

use crate::traits::{
    BlobStore, Connector, ConnectorError, ConnectorHealth, ConnectorResult, ObjectProbe,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage operation, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobOp {
    Head,
    Get,
    Put,
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// In-memory [`BlobStore`].
pub struct MockBlobStore {
    name: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failing: Arc<RwLock<HashSet<(BlobOp, String)>>>,
    calls: Arc<RwLock<Vec<(BlobOp, String)>>>,
}

impl MockBlobStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seeds an object without recording a call.
    pub async fn insert(&self, key: &str, body: impl Into<Bytes>) {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                content_type: None,
            },
        );
    }

    /// Makes `op` on `key` fail with an I/O error.
    pub async fn fail(&self, op: BlobOp, key: &str) {
        self.failing.write().await.insert((op, key.to_string()));
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn calls(&self) -> Vec<(BlobOp, String)> {
        self.calls.read().await.clone()
    }

    pub async fn put_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|(op, _)| *op == BlobOp::Put)
            .count()
    }

    async fn enter(&self, op: BlobOp, key: &str) -> ConnectorResult<()> {
        self.calls.write().await.push((op, key.to_string()));
        if self.failing.read().await.contains(&(op, key.to_string())) {
            return Err(ConnectorError::ConnectionFailed(format!(
                "Mock {:?} of {} failed",
                op, key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "storage"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn head(&self, key: &str) -> ConnectorResult<ObjectProbe> {
        self.enter(BlobOp::Head, key).await?;
        Ok(if self.objects.read().await.contains_key(key) {
            ObjectProbe::Exists
        } else {
            ObjectProbe::NotFound
        })
    }

    async fn get(&self, key: &str) -> ConnectorResult<Bytes> {
        self.enter(BlobOp::Get, key).await?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| ConnectorError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> ConnectorResult<()> {
        self.enter(BlobOp::Put, key).await?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_calls() {
        let store = MockBlobStore::new("mock");
        store.insert("old/a.js", "body").await;

        assert_eq!(store.head("new/a.js").await.unwrap(), ObjectProbe::NotFound);
        let body = store.get("old/a.js").await.unwrap();
        store
            .put("new/a.js", body, "application/javascript")
            .await
            .unwrap();

        let stored = store.object("new/a.js").await.unwrap();
        assert_eq!(stored.body, Bytes::from("body"));
        assert_eq!(stored.content_type.as_deref(), Some("application/javascript"));
        assert_eq!(
            store.calls().await.iter().map(|(op, _)| *op).collect::<Vec<_>>(),
            vec![BlobOp::Head, BlobOp::Get, BlobOp::Put]
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MockBlobStore::new("mock");
        store.fail(BlobOp::Head, "new/a.js").await;
        assert!(matches!(
            store.head("new/a.js").await,
            Err(ConnectorError::ConnectionFailed(_))
        ));
        assert!(store.get("missing").await.unwrap_err().is_not_found());
    }
}

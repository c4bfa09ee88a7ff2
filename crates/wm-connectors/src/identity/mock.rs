//! Mock identity provider for testing.

use crate::traits::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, Identity, IdentityPage,
    IdentityProvider,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Serves a fixed list of pages. Page `n` is addressed by cursor `page-n`.
pub struct MockIdentityProvider {
    name: String,
    pages: Arc<RwLock<Vec<Vec<Identity>>>>,
    fail_on_page: Arc<RwLock<Option<usize>>>,
    requests: Arc<RwLock<Vec<(usize, Option<String>)>>>,
}

impl MockIdentityProvider {
    pub fn new(name: &str) -> Self {
        Self::with_pages(name, Vec::new())
    }

    pub fn with_pages(name: &str, pages: Vec<Vec<Identity>>) -> Self {
        Self {
            name: name.to_string(),
            pages: Arc::new(RwLock::new(pages)),
            fail_on_page: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Splits `identities` into pages of `page_size`.
    pub fn paged(name: &str, identities: Vec<Identity>, page_size: usize) -> Self {
        let pages = identities
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Self::with_pages(name, pages)
    }

    /// Makes the request for page `index` fail with a connection error.
    pub async fn fail_on_page(&self, index: usize) {
        *self.fail_on_page.write().await = Some(index);
    }

    /// `(page_size, cursor)` of every request so far.
    pub async fn requests(&self) -> Vec<(usize, Option<String>)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl Connector for MockIdentityProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "identity"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn list_page(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ConnectorResult<IdentityPage> {
        self.requests
            .write()
            .await
            .push((page_size, cursor.map(String::from)));

        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ConnectorError::InvalidResponse(format!("Bad cursor: {}", c)))?,
        };

        if *self.fail_on_page.read().await == Some(index) {
            return Err(ConnectorError::ConnectionFailed(
                "Mock identity provider unavailable".into(),
            ));
        }

        let pages = self.pages.read().await;
        let identities = pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(IdentityPage {
            identities,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_identities;

    #[tokio::test]
    async fn test_paged_cursors() {
        let provider = MockIdentityProvider::paged("mock", sample_identities(5), 2);

        let first = provider.list_page(2, None).await.unwrap();
        assert_eq!(first.identities.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("page-1"));

        let last = provider.list_page(2, Some("page-2")).await.unwrap();
        assert_eq!(last.identities.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let provider = MockIdentityProvider::paged("mock", sample_identities(4), 2);
        provider.fail_on_page(1).await;

        assert!(provider.list_page(2, None).await.is_ok());
        assert!(matches!(
            provider.list_page(2, Some("page-1")).await,
            Err(ConnectorError::ConnectionFailed(_))
        ));
        assert_eq!(provider.requests().await.len(), 2);
    }
}

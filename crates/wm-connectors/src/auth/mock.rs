//! Mock token provider for testing.

use crate::traits::{
    BearerCredential, Connector, ConnectorError, ConnectorHealth, ConnectorResult, TokenProvider,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Issues `token-<identity>` credentials and records every request.
pub struct MockTokenProvider {
    name: String,
    failing: Arc<RwLock<HashSet<String>>>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockTokenProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failing: Arc::new(RwLock::new(HashSet::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Makes every token request for `identity_id` fail.
    pub async fn fail_identity(&self, identity_id: &str) {
        self.failing.write().await.insert(identity_id.to_string());
    }

    /// Identity ids requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl Connector for MockTokenProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "auth"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn get_token(&self, identity_id: &str) -> ConnectorResult<BearerCredential> {
        self.requests.write().await.push(identity_id.to_string());
        if self.failing.read().await.contains(identity_id) {
            return Err(ConnectorError::AuthenticationFailed(format!(
                "Mock signer rejected {}",
                identity_id
            )));
        }
        Ok(BearerCredential::new(format!("token-{}", identity_id)))
    }
}

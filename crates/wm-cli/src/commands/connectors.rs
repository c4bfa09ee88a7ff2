//! Builds the production boundaries from the application config.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wm_connectors::{
    Connector, ConnectorConfig, FirebaseIdentityConfig, FirebaseIdentityProvider,
    FirebaseTokenConfig, FirebaseTokenProvider, ObjectStoreBlobStore, RateLimitConfig,
    ResourceApiConfig, ResourceApiConnector, SecureString,
};
use wm_core::{MigrationOrchestrator, OrchestratorConfig};

use crate::config::AppConfig;

/// The four external collaborators of a run.
pub struct Boundaries {
    pub tokens: Arc<FirebaseTokenProvider>,
    pub identities: Arc<FirebaseIdentityProvider>,
    pub resources: Arc<ResourceApiConnector>,
    pub store: Arc<ObjectStoreBlobStore>,
}

fn connector_config(name: &str, base_url: &str, config: &AppConfig) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        timeout_secs: config.api.timeout_secs,
        max_retries: config.api.max_retries,
        verify_tls: true,
        headers: HashMap::new(),
    }
}

impl Boundaries {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let key = config.service_account_key()?;
        let project_id = config.project_id(&key);

        let tokens = FirebaseTokenProvider::new(
            FirebaseTokenConfig {
                connector: connector_config("tokens", &config.auth.exchange_url, config),
                api_key: SecureString::new(config.auth.api_key.clone()),
                cache_ttl: Duration::from_secs(config.auth.token_cache_ttl_secs),
            },
            key.clone(),
        )
        .context("Failed to create token provider")?;

        let identities = FirebaseIdentityProvider::new(
            FirebaseIdentityConfig {
                connector: connector_config("identities", &config.auth.identity_base_url, config),
                project_id,
            },
            key,
        )
        .context("Failed to create identity provider")?;

        let resources = ResourceApiConnector::new(ResourceApiConfig {
            connector: connector_config("resources", &config.api.base_url, config),
            update_timeout: Duration::from_secs(config.api.update_timeout_secs),
            resource_header: config.api.resource_header.clone(),
            rate_limit: config.api.rate_limit_per_minute.map(RateLimitConfig::per_minute),
        })
        .context("Failed to create resource API connector")?;

        let store = ObjectStoreBlobStore::from_s3(
            &config.storage.bucket,
            &config.storage.region,
            config.storage.endpoint.as_deref(),
        )
        .context("Failed to create object store")?;

        Ok(Self {
            tokens: Arc::new(tokens),
            identities: Arc::new(identities),
            resources: Arc::new(resources),
            store: Arc::new(store),
        })
    }

    /// An orchestrator over these boundaries, stopped by `shutdown`.
    pub fn orchestrator(
        &self,
        config: OrchestratorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> MigrationOrchestrator {
        MigrationOrchestrator::new(
            config,
            self.tokens.clone(),
            self.identities.clone(),
            self.resources.clone(),
            self.store.clone(),
        )
        .with_shutdown(shutdown)
    }

    /// Every boundary, for health checks.
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        vec![
            self.identities.clone() as Arc<dyn Connector>,
            self.tokens.clone() as Arc<dyn Connector>,
            self.resources.clone() as Arc<dyn Connector>,
            self.store.clone() as Arc<dyn Connector>,
        ]
    }
}

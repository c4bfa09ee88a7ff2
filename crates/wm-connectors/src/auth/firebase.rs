//! Custom-token sign-in against the identity toolkit.
//!
//! A credential for an identity is obtained in two steps: mint a custom token
//! for the identity with the service-account key, then exchange it at
//! `accounts:signInWithCustomToken` for an ID token. ID tokens live for an
//! hour, so they are cached per identity for slightly less than that.

use super::service_account::ServiceAccountKey;
use crate::http::{HttpClient, RequestOptions};
use crate::secure_string::SecureString;
use crate::traits::{
    BearerCredential, Connector, ConnectorConfig, ConnectorError, ConnectorHealth,
    ConnectorResult, TokenProvider,
};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default exchange endpoint.
pub const DEFAULT_EXCHANGE_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithCustomToken";

/// Token provider configuration.
#[derive(Debug, Clone)]
pub struct FirebaseTokenConfig {
    /// Connection settings; `base_url` is the exchange endpoint.
    pub connector: ConnectorConfig,
    /// Web API key sent as the `key` query parameter.
    pub api_key: SecureString,
    /// How long an exchanged credential is reused.
    pub cache_ttl: Duration,
}

/// Mints and exchanges custom tokens for identities.
pub struct FirebaseTokenProvider {
    config: FirebaseTokenConfig,
    key: ServiceAccountKey,
    client: HttpClient,
    cache: Cache<String, BearerCredential>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    id_token: Option<String>,
}

impl FirebaseTokenProvider {
    pub fn new(config: FirebaseTokenConfig, key: ServiceAccountKey) -> ConnectorResult<Self> {
        let client = HttpClient::new(config.connector.clone())?;
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(config.cache_ttl)
            .build();
        Ok(Self {
            config,
            key,
            client,
            cache,
        })
    }

    /// Exchanges a signed custom token for a bearer credential.
    async fn exchange(&self, signed: &SecureString) -> ConnectorResult<BearerCredential> {
        let options = RequestOptions::new().query("key", self.config.api_key.expose_secret());
        let body = ExchangeRequest {
            token: signed.expose_secret(),
            return_secure_token: true,
        };

        let response: ExchangeResponse = self
            .client
            .post_json("", &body, &options)
            .await
            .map_err(|e| match e {
                ConnectorError::AuthenticationFailed(msg) => {
                    ConnectorError::AuthenticationFailed(msg)
                }
                other => ConnectorError::AuthenticationFailed(format!(
                    "Token exchange failed: {}",
                    other
                )),
            })?;

        response
            .id_token
            .filter(|t| !t.is_empty())
            .map(BearerCredential::new)
            .ok_or_else(|| {
                ConnectorError::AuthenticationFailed("Exchange response has no idToken".into())
            })
    }
}

#[async_trait]
impl Connector for FirebaseTokenProvider {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "auth"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        // Signing proves the key is usable without creating a session.
        match self.key.mint_custom_token("health-check") {
            Ok(_) if self.config.api_key.is_empty() => {
                Ok(ConnectorHealth::Degraded("API key is not set".into()))
            }
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl TokenProvider for FirebaseTokenProvider {
    #[instrument(skip(self))]
    async fn get_token(&self, identity_id: &str) -> ConnectorResult<BearerCredential> {
        if let Some(cached) = self.cache.get(identity_id).await {
            debug!("Reusing cached credential");
            return Ok(cached);
        }

        let signed = self.key.mint_custom_token(identity_id)?;
        let credential = self.exchange(&signed).await.map_err(|e| {
            warn!(error = %e, "Credential exchange failed");
            e
        })?;

        self.cache
            .insert(identity_id.to_string(), credential.clone())
            .await;
        Ok(credential)
    }
}

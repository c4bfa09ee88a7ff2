//! Identity toolkit user listing.
//!
//! Users are listed through the admin `accounts:batchGet` endpoint, which
//! pages with an opaque `nextPageToken`. Admin calls are authorised with an
//! OAuth2 access token obtained through the JWT-bearer grant and cached until
//! shortly before it expires.

use crate::auth::ServiceAccountKey;
use crate::http::{HttpClient, RequestOptions};
use crate::secure_string::SecureString;
use crate::traits::{
    Connector, ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult, Identity,
    IdentityPage, IdentityProvider,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Default admin API base.
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Scope requested for admin listing.
pub const IDENTITY_ADMIN_SCOPE: &str = "https://www.googleapis.com/auth/identitytoolkit";

/// Largest page the listing endpoint serves.
pub const MAX_PAGE_SIZE: usize = 1000;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Identity provider configuration.
#[derive(Debug, Clone)]
pub struct FirebaseIdentityConfig {
    /// Connection settings; `base_url` is the admin API base.
    pub connector: ConnectorConfig,
    /// Project whose users are listed.
    pub project_id: String,
}

/// Admin access token with expiration.
#[derive(Clone)]
struct AccessToken {
    token: SecureString,
    expires_at: Instant,
}

/// Lists users of an identity toolkit project.
pub struct FirebaseIdentityProvider {
    config: FirebaseIdentityConfig,
    key: ServiceAccountKey,
    client: HttpClient,
    access_token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl FirebaseIdentityProvider {
    pub fn new(config: FirebaseIdentityConfig, key: ServiceAccountKey) -> ConnectorResult<Self> {
        let client = HttpClient::new(config.connector.clone())?;
        info!(
            "Identity provider initialized for project '{}'",
            config.project_id
        );
        Ok(Self {
            config,
            key,
            client,
            access_token: RwLock::new(None),
        })
    }

    fn parse_user(user: UserRecord) -> Identity {
        Identity {
            id: user.local_id,
            display_name: user.display_name,
            email: user.email,
        }
    }

    /// Gets or refreshes the admin access token.
    async fn admin_token(&self) -> ConnectorResult<SecureString> {
        {
            let token = self.access_token.read().await;
            if let Some(t) = &*token {
                if t.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(t.token.clone());
                }
            }
        }

        debug!("Fetching admin access token");
        let assertion = self.key.mint_grant_assertion(IDENTITY_ADMIN_SCOPE)?;
        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.expose_secret()),
        ];
        let response: TokenResponse = self
            .client
            .post_form_url(&self.key.token_uri, &form)
            .await
            .map_err(|e| {
                ConnectorError::AuthenticationFailed(format!("Admin token request failed: {}", e))
            })?;

        let token = SecureString::new(response.access_token);
        *self.access_token.write().await = Some(AccessToken {
            token: token.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(token)
    }

    fn list_path(&self) -> String {
        format!(
            "/projects/{}/accounts:batchGet",
            urlencoding::encode(&self.config.project_id)
        )
    }
}

#[async_trait]
impl Connector for FirebaseIdentityProvider {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "identity"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.list_page(1, None).await {
            Ok(_) => Ok(ConnectorHealth::Healthy),
            Err(ConnectorError::AuthenticationFailed(e)) => Ok(ConnectorHealth::Unhealthy(
                format!("Authentication failed: {}", e),
            )),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    #[instrument(skip(self))]
    async fn list_page(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ConnectorResult<IdentityPage> {
        let token = self.admin_token().await?;
        let mut options = RequestOptions::new()
            .bearer(&token)
            .query("maxResults", page_size.clamp(1, MAX_PAGE_SIZE).to_string());
        if let Some(cursor) = cursor {
            options = options.query("nextPageToken", cursor);
        }

        let response: BatchGetResponse = self.client.get_json(&self.list_path(), &options).await?;
        let identities: Vec<Identity> = response.users.into_iter().map(Self::parse_user).collect();
        debug!(count = identities.len(), "Fetched identity page");

        Ok(IdentityPage {
            identities,
            next_cursor: response.next_page_token.filter(|c| !c.is_empty()),
        })
    }
}

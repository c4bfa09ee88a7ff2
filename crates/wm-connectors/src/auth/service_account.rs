//! Service-account keys and the signed assertions minted from them.
//!
//! Two kinds of RS256 assertions are minted here:
//! - custom tokens that let the migrator sign in *as* a given identity, and
//! - JWT-bearer grants exchanged for an admin OAuth2 access token.

use crate::secure_string::SecureString;
use crate::traits::{ConnectorError, ConnectorResult};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Audience the identity toolkit expects on custom tokens.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Default OAuth2 token endpoint for service-account grants.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime of every minted assertion, in seconds. One hour is the maximum
/// the token endpoints accept.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// A service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    private_key: SecureString,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CustomTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
    uid: &'a str,
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

impl ServiceAccountKey {
    /// Parses a key from its JSON form.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        let key: Self = serde_json::from_str(json).map_err(|e| {
            ConnectorError::ConfigError(format!("Invalid service account JSON: {}", e))
        })?;
        if key.private_key.is_empty() {
            return Err(ConnectorError::ConfigError(
                "Service account private_key is empty".into(),
            ));
        }
        Ok(key)
    }

    /// Reads and parses a key file.
    pub fn from_file(path: &Path) -> ConnectorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::ConfigError(format!(
                "Failed to read service account file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }

    /// Mints a custom token that signs in as `uid`.
    pub fn mint_custom_token(&self, uid: &str) -> ConnectorResult<SecureString> {
        let iat = unix_now();
        let claims = CustomTokenClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud: CUSTOM_TOKEN_AUDIENCE,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            uid,
        };
        self.sign(&claims)
    }

    /// Mints a JWT-bearer grant assertion for `scope` against the key's token endpoint.
    pub fn mint_grant_assertion(&self, scope: &str) -> ConnectorResult<SecureString> {
        let iat = unix_now();
        let claims = GrantClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        self.sign(&claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> ConnectorResult<SecureString> {
        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| {
                ConnectorError::AuthenticationFailed(format!("Invalid signing key: {}", e))
            })?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        jsonwebtoken::encode(&header, claims, &key)
            .map(SecureString::new)
            .map_err(|e| ConnectorError::AuthenticationFailed(format!("Failed to sign: {}", e)))
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

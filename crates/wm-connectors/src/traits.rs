//! Connector trait definitions for the workspace migrator.
//!
//! Every external collaborator the migration touches sits behind one of the
//! traits in this module: the token provider, the identity provider, the
//! remote resource API and the object store. Production implementations and
//! in-memory mocks implement the same traits so the orchestrator never knows
//! which one it is driving.

use crate::secure_string::SecureString;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Returns true if the error means the addressed entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectorError::NotFound(_))
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    /// Connector is healthy and operational.
    Healthy,
    /// Connector answered but something looks off.
    Degraded(String),
    /// Connector is not operational.
    Unhealthy(String),
}

/// Connection settings shared by all HTTP-backed connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name, used in logs.
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Default request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for idempotent transport failures.
    pub max_retries: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
    /// Additional headers sent with every request.
    pub headers: HashMap<String, String>,
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the connector type (e.g. "auth", "identity", "resources", "storage").
    fn connector_type(&self) -> &str;

    /// Checks the health of the connector.
    async fn health_check(&self) -> ConnectorResult<ConnectorHealth>;
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// An external account whose resources are being migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// External unique id.
    pub id: String,
    /// Display name, if the provider knows one.
    pub display_name: Option<String>,
    /// Email address, if the provider knows one.
    pub email: Option<String>,
}

/// One page of identities returned by an [`IdentityProvider`].
#[derive(Debug, Clone, Default)]
pub struct IdentityPage {
    /// Identities on this page.
    pub identities: Vec<Identity>,
    /// Opaque cursor for the next page; `None` ends pagination.
    pub next_cursor: Option<String>,
}

/// Cursor-paginated source of identities.
#[async_trait]
pub trait IdentityProvider: Connector {
    /// Fetches one page of at most `page_size` identities.
    async fn list_page(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> ConnectorResult<IdentityPage>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A short-lived bearer credential for acting as one identity.
#[derive(Clone)]
pub struct BearerCredential(SecureString);

impl BearerCredential {
    pub fn new(token: impl Into<SecureString>) -> Self {
        Self(token.into())
    }

    /// The raw token, without the `Bearer ` prefix.
    pub fn token(&self) -> &SecureString {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerCredential([REDACTED])")
    }
}

/// Exchanges an identity for a bearer credential usable against the resource API.
#[async_trait]
pub trait TokenProvider: Connector {
    /// Returns a credential for `identity_id`.
    ///
    /// Any failure while minting or exchanging surfaces as
    /// [`ConnectorError::AuthenticationFailed`].
    async fn get_token(&self, identity_id: &str) -> ConnectorResult<BearerCredential>;
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The grouping entity an identity's resources are re-parented into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Server-generated id.
    pub id: String,
    /// Identity that owns the container.
    pub owner_id: String,
    /// Human readable name.
    pub name: String,
}

/// A top-level resource owned by an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedResource {
    /// Resource id.
    pub id: String,
    /// Current owner id as reported by the API.
    pub owner_id: String,
    /// Everything else the API returned for the resource.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Kinds of sub-resources that carry blob artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResourceKind {
    Branch,
    Version,
}

impl fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubResourceKind::Branch => write!(f, "branch"),
            SubResourceKind::Version => write!(f, "version"),
        }
    }
}

/// A branch or version of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    pub kind: SubResourceKind,
    /// Parent resource id.
    pub resource_id: String,
    /// Branch id or version ordinal, normalised to a string.
    pub id: String,
}

/// Owned resources of one identity.
#[derive(Debug, Clone, Default)]
pub struct OwnedResourceList {
    pub resources: Vec<OwnedResource>,
    /// Set when the payload did not have the expected shape and the list was
    /// degraded to empty.
    pub malformed: Option<String>,
}

impl OwnedResourceList {
    pub fn new(resources: Vec<OwnedResource>) -> Self {
        Self {
            resources,
            malformed: None,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            resources: Vec::new(),
            malformed: Some(reason.into()),
        }
    }
}

/// Typed operations against the remote resource API.
///
/// Every call acts as the identity the credential was issued for.
#[async_trait]
pub trait ResourceClient: Connector {
    /// Lists containers owned by `owner_id`. A 404 or empty payload is an empty list.
    async fn find_containers(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<Vec<Container>>;

    /// Creates a container unconditionally. Callers must look up first.
    async fn create_container(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
        name: &str,
    ) -> ConnectorResult<Container>;

    /// Lists resources owned by `owner_id`, degrading a malformed payload to empty.
    async fn list_owned_resources(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<OwnedResourceList>;

    /// Re-parents one resource under `new_owner_id`.
    async fn update_resource_owner(
        &self,
        credential: &BearerCredential,
        resource_id: &str,
        new_owner_id: &str,
    ) -> ConnectorResult<()>;

    /// Lists branches or versions of a resource.
    async fn list_sub_resources(
        &self,
        credential: &BearerCredential,
        kind: SubResourceKind,
        resource_id: &str,
    ) -> ConnectorResult<Vec<SubResource>>;
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// Outcome of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectProbe {
    Exists,
    NotFound,
}

/// Key-addressed blob storage.
#[async_trait]
pub trait BlobStore: Connector {
    /// Probes whether `key` exists.
    async fn head(&self, key: &str) -> ConnectorResult<ObjectProbe>;

    /// Fetches the object at `key`; an absent key is [`ConnectorError::NotFound`].
    async fn get(&self, key: &str) -> ConnectorResult<Bytes>;

    /// Writes `body` to `key` with the given content type.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> ConnectorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_credential_redacts_debug() {
        let credential = BearerCredential::new("secret-token");
        assert_eq!(format!("{:?}", credential), "BearerCredential([REDACTED])");
        assert_eq!(credential.header_value(), "Bearer secret-token");
    }

    #[test]
    fn test_sub_resource_kind_display() {
        assert_eq!(SubResourceKind::Branch.to_string(), "branch");
        assert_eq!(SubResourceKind::Version.to_string(), "version");
    }

    #[test]
    fn test_malformed_resource_list_is_empty() {
        let list = OwnedResourceList::malformed("projects missing");
        assert!(list.resources.is_empty());
        assert_eq!(list.malformed.as_deref(), Some("projects missing"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(ConnectorError::NotFound("x".into()).is_not_found());
        assert!(!ConnectorError::Timeout("x".into()).is_not_found());
    }
}

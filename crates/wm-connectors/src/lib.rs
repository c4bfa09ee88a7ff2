//! # wm-connectors
//!
//! Boundary connectors for the workspace migrator: credential issuance,
//! identity listing, the remote resource API and object storage.
//!
//! This crate provides the trait definitions the migration core drives, the
//! production implementations and the in-memory mocks used by tests.

pub mod auth;
pub mod http;
pub mod identity;
pub mod resources;
pub mod secure_string;
pub mod storage;
pub mod testing;
pub mod traits;

pub use secure_string::SecureString;

// Re-export traits
pub use traits::{
    BearerCredential,
    // Storage
    BlobStore,
    Connector,
    ConnectorConfig,
    ConnectorError,
    ConnectorHealth,
    ConnectorResult,
    Container,
    // Identity
    Identity,
    IdentityPage,
    IdentityProvider,
    ObjectProbe,
    OwnedResource,
    OwnedResourceList,
    // Resources
    ResourceClient,
    SubResource,
    SubResourceKind,
    // Auth
    TokenProvider,
};

// Re-export connector implementations
pub use auth::{FirebaseTokenConfig, FirebaseTokenProvider, MockTokenProvider, ServiceAccountKey};
pub use http::RateLimitConfig;
pub use identity::{FirebaseIdentityConfig, FirebaseIdentityProvider, MockIdentityProvider};
pub use resources::{MockResourceClient, ResourceApiConfig, ResourceApiConnector};
pub use storage::{MockBlobStore, ObjectStoreBlobStore};

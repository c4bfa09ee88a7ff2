//! Migration error taxonomy.
//!
//! Errors are contained at the smallest unit that produced them (artifact,
//! resource, identity) and stored in the run report. Only
//! [`MigrationError::Enumeration`] ends a run.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wm_connectors::ConnectorError;

/// Errors recorded or raised during a migration run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MigrationError {
    /// Credential mint or exchange failed. Fatal to one identity.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or server error on a per-identity call. Fatal to one identity.
    #[error("Transient API error: {0}")]
    TransientApi(String),

    /// Unexpected payload shape, degraded to an empty result.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Re-parenting one resource failed.
    #[error("Resource update failed: {0}")]
    ResourceUpdate(String),

    /// Legacy artifact is absent.
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Canonical key is already present.
    #[error("Blob already exists: {0}")]
    BlobConflict(String),

    /// Probe, fetch or write failed.
    #[error("Blob I/O error: {0}")]
    BlobIo(String),

    /// The identity listing failed.
    #[error("Identity enumeration failed: {0}")]
    Enumeration(String),

    /// An explicitly requested identity is not in the enumerated set.
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// The kind of call a [`ConnectorError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Credential,
    Enumeration,
    IdentityCall,
    ResourceUpdate,
    BlobProbe,
    BlobRead,
    BlobWrite,
}

impl MigrationError {
    /// Maps a connector error into the taxonomy by the operation that produced it.
    pub fn classify(operation: Operation, error: &ConnectorError) -> Self {
        let message = error.to_string();
        match operation {
            Operation::Credential => MigrationError::Auth(message),
            Operation::Enumeration => MigrationError::Enumeration(message),
            Operation::IdentityCall => match error {
                ConnectorError::InvalidResponse(_) => MigrationError::MalformedResponse(message),
                ConnectorError::AuthenticationFailed(_) => MigrationError::Auth(message),
                _ => MigrationError::TransientApi(message),
            },
            Operation::ResourceUpdate => MigrationError::ResourceUpdate(message),
            Operation::BlobRead if error.is_not_found() => MigrationError::BlobNotFound(message),
            Operation::BlobProbe | Operation::BlobRead | Operation::BlobWrite => {
                MigrationError::BlobIo(message)
            }
        }
    }

    /// True if the error must stop the whole run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, MigrationError::Enumeration(_))
    }
}

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

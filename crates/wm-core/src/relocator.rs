//! Existence-checked blob relocation.
//!
//! Every relocation checks the canonical key first, so a key is written at
//! most once however many times a run is repeated:
//!
//! 1. `head(new)`: present ⇒ `skipped_exists`; head error ⇒ `failed`.
//! 2. `get(old)`: absent ⇒ `skipped_missing`; other error ⇒ `failed`.
//! 3. `put(new)`: error ⇒ `failed`; success ⇒ `migrated`.

use crate::error::{MigrationError, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use wm_connectors::{BlobStore, ObjectProbe};

/// Outcome of one relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationStatus {
    Migrated,
    SkippedExists,
    SkippedMissing,
    Failed,
}

impl fmt::Display for RelocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocationStatus::Migrated => write!(f, "migrated"),
            RelocationStatus::SkippedExists => write!(f, "skipped-exists"),
            RelocationStatus::SkippedMissing => write!(f, "skipped-missing"),
            RelocationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one relocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRecord {
    pub old_key: String,
    pub new_key: String,
    pub status: RelocationStatus,
    /// Why the artifact was skipped or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

impl RelocationRecord {
    fn new(old_key: &str, new_key: &str, status: RelocationStatus, error: Option<MigrationError>) -> Self {
        Self {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
            status,
            error,
        }
    }
}

/// Copies blobs from legacy to canonical keys.
#[derive(Clone)]
pub struct BlobRelocator {
    store: Arc<dyn BlobStore>,
}

impl BlobRelocator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Relocates `old_key` to `new_key`. Never fails; the outcome is the record.
    #[instrument(skip(self, content_type))]
    pub async fn relocate(&self, old_key: &str, new_key: &str, content_type: &str) -> RelocationRecord {
        let record = |status, error| RelocationRecord::new(old_key, new_key, status, error);

        match self.store.head(new_key).await {
            Ok(ObjectProbe::Exists) => {
                debug!("Canonical key already present");
                return record(
                    RelocationStatus::SkippedExists,
                    Some(MigrationError::BlobConflict(new_key.to_string())),
                );
            }
            Ok(ObjectProbe::NotFound) => {}
            Err(e) => {
                warn!(error = %e, "Existence check failed");
                return record(
                    RelocationStatus::Failed,
                    Some(MigrationError::classify(Operation::BlobProbe, &e)),
                );
            }
        }

        let body = match self.store.get(old_key).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                debug!("Legacy artifact absent");
                return record(
                    RelocationStatus::SkippedMissing,
                    Some(MigrationError::BlobNotFound(old_key.to_string())),
                );
            }
            Err(e) => {
                warn!(error = %e, "Fetching legacy artifact failed");
                return record(
                    RelocationStatus::Failed,
                    Some(MigrationError::classify(Operation::BlobRead, &e)),
                );
            }
        };

        match self.store.put(new_key, body, content_type).await {
            Ok(()) => {
                info!("Relocated artifact");
                record(RelocationStatus::Migrated, None)
            }
            Err(e) => {
                warn!(error = %e, "Writing canonical artifact failed");
                record(
                    RelocationStatus::Failed,
                    Some(MigrationError::classify(Operation::BlobWrite, &e)),
                )
            }
        }
    }
}

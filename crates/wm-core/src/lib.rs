//! # wm-core
//!
//! Core of the workspace migrator.
//!
//! This crate provides identity enumeration, the legacy-to-canonical key
//! layout, the existence-checked blob relocator, the migration orchestrator
//! and the typed run report its outcomes accumulate into.

pub mod error;
pub mod identities;
pub mod keys;
pub mod orchestrator;
pub mod relocator;
pub mod report;

pub use error::{MigrationError, MigrationResult, Operation};
pub use identities::{IdentitySource, DEFAULT_PAGE_SIZE};
pub use keys::{ArtifactKeys, ArtifactKind, KeyLayout};
pub use orchestrator::{
    container_name, MigrationOrchestrator, OrchestratorConfig, RunOptions,
    DEFAULT_CONTAINER_NAME, DEFAULT_PACING,
};
pub use relocator::{BlobRelocator, RelocationRecord, RelocationStatus};
pub use report::{
    ContainerResolution, DryRunIdentity, DryRunReport, IdentityOutcome, IdentityStage,
    IdentityStatus, OwnershipOutcome, RelocationEntry, RelocationSweepOutcome, ResourceOutcome,
    ResourceStatus, RunReport, RunSummary, SubResourceFailure,
};

//! Per-unit outcomes and the run report.
//!
//! Every unit of work (identity, resource, artifact) ends as a tagged
//! outcome value. The report is append-only while a run is in progress and
//! its [`RunSummary`] is derived once when the run finishes.

use crate::error::MigrationError;
use crate::keys::ArtifactKind;
use crate::relocator::{RelocationRecord, RelocationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use wm_connectors::SubResourceKind;

/// Progress of one identity through the ownership sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStage {
    Start,
    ContainerResolved,
    ResourcesListed,
    ResourcesUpdated,
    Done,
}

impl IdentityStage {
    /// Whether `next` may follow `self`. An empty resource list goes from
    /// `ResourcesListed` straight to `Done`.
    pub fn can_advance_to(self, next: IdentityStage) -> bool {
        use IdentityStage::*;
        matches!(
            (self, next),
            (Start, ContainerResolved)
                | (ContainerResolved, ResourcesListed)
                | (ResourcesListed, ResourcesUpdated)
                | (ResourcesListed, Done)
                | (ResourcesUpdated, Done)
        )
    }
}

impl fmt::Display for IdentityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityStage::Start => "start",
            IdentityStage::ContainerResolved => "container_resolved",
            IdentityStage::ResourcesListed => "resources_listed",
            IdentityStage::ResourcesUpdated => "resources_updated",
            IdentityStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Final status of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Done,
    Failed,
    /// Not processed because the run was cancelled first.
    Skipped,
}

/// The container an identity's resources were re-parented into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResolution {
    pub container_id: String,
    pub name: String,
    /// False when an existing container was reused.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Updated,
    Failed,
}

/// Result of re-parenting one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub resource_id: String,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

impl ResourceOutcome {
    pub fn updated(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            status: ResourceStatus::Updated,
            error: None,
        }
    }

    pub fn failed(resource_id: &str, error: MigrationError) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            status: ResourceStatus::Failed,
            error: Some(error),
        }
    }
}

/// Ownership sweep result for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipOutcome {
    /// Last stage reached.
    pub stage: IdentityStage,
    pub container: Option<ContainerResolution>,
    pub resources: Vec<ResourceOutcome>,
    /// Non-fatal problems, e.g. a malformed resource listing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MigrationError>,
    /// Set when the identity failed; `stage` is where it stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

impl Default for OwnershipOutcome {
    fn default() -> Self {
        Self {
            stage: IdentityStage::Start,
            container: None,
            resources: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }
}

/// Relocation sweep result for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationSweepOutcome {
    /// Resources swept.
    pub resources: usize,
    /// Relocations attempted.
    pub artifacts: usize,
    /// Non-fatal listing problems, e.g. a malformed resource listing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MigrationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

/// Everything that happened to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOutcome {
    pub identity_id: String,
    pub status: IdentityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocation: Option<RelocationSweepOutcome>,
    /// Set when the identity itself could not be processed, e.g. an unknown
    /// explicitly requested id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

impl IdentityOutcome {
    pub fn skipped(identity_id: &str) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            status: IdentityStatus::Skipped,
            ownership: None,
            relocation: None,
            error: None,
        }
    }

    pub fn failed(identity_id: &str, error: MigrationError) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            status: IdentityStatus::Failed,
            ownership: None,
            relocation: None,
            error: Some(error),
        }
    }

    /// Combines the sweeps that ran; any sweep error fails the identity.
    pub fn completed(
        identity_id: &str,
        ownership: Option<OwnershipOutcome>,
        relocation: Option<RelocationSweepOutcome>,
    ) -> Self {
        let failed = ownership.as_ref().is_some_and(|o| o.error.is_some())
            || relocation.as_ref().is_some_and(|r| r.error.is_some());
        Self {
            identity_id: identity_id.to_string(),
            status: if failed {
                IdentityStatus::Failed
            } else {
                IdentityStatus::Done
            },
            ownership,
            relocation,
            error: None,
        }
    }
}

/// A relocation record with the unit of work it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationEntry {
    pub identity_id: String,
    pub resource_id: String,
    pub sub_resource: SubResourceKind,
    pub sub_resource_id: String,
    pub artifact: ArtifactKind,
    #[serde(flatten)]
    pub record: RelocationRecord,
}

/// A branch or version listing that failed during the relocation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResourceFailure {
    pub identity_id: String,
    pub resource_id: String,
    pub kind: SubResourceKind,
    pub error: MigrationError,
}

/// Counts derived from a finished report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub identities_processed: usize,
    pub identities_skipped: usize,
    pub identities_failed: usize,
    pub containers_created: usize,
    pub containers_reused: usize,
    pub resources_updated: usize,
    pub resources_failed: usize,
    pub relocations_migrated: usize,
    pub relocations_skipped_exists: usize,
    pub relocations_skipped_missing: usize,
    pub relocations_failed: usize,
    pub sub_resource_failures: usize,
    pub warnings: usize,
}

/// Output of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Identities enumerated.
    pub identities_total: usize,
    /// Identities selected after the identity limit.
    pub identities_selected: usize,
    pub identities: Vec<IdentityOutcome>,
    pub relocations: Vec<RelocationEntry>,
    pub sub_resource_failures: Vec<SubResourceFailure>,
    pub cancelled: bool,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(identities_total: usize, identities_selected: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            identities_total,
            identities_selected,
            identities: Vec::new(),
            relocations: Vec::new(),
            sub_resource_failures: Vec::new(),
            cancelled: false,
            summary: RunSummary::default(),
        }
    }

    /// Stamps the finish time and derives the summary.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.summary = self.summarize();
    }

    pub fn summarize(&self) -> RunSummary {
        let mut summary = RunSummary {
            sub_resource_failures: self.sub_resource_failures.len(),
            ..RunSummary::default()
        };

        for identity in &self.identities {
            match identity.status {
                IdentityStatus::Done => summary.identities_processed += 1,
                IdentityStatus::Failed => summary.identities_failed += 1,
                IdentityStatus::Skipped => summary.identities_skipped += 1,
            }
            if let Some(relocation) = &identity.relocation {
                summary.warnings += relocation.warnings.len();
            }
            let Some(ownership) = &identity.ownership else {
                continue;
            };
            match &ownership.container {
                Some(c) if c.created => summary.containers_created += 1,
                Some(_) => summary.containers_reused += 1,
                None => {}
            }
            summary.warnings += ownership.warnings.len();
            for resource in &ownership.resources {
                match resource.status {
                    ResourceStatus::Updated => summary.resources_updated += 1,
                    ResourceStatus::Failed => summary.resources_failed += 1,
                }
            }
        }

        for entry in &self.relocations {
            match entry.record.status {
                RelocationStatus::Migrated => summary.relocations_migrated += 1,
                RelocationStatus::SkippedExists => summary.relocations_skipped_exists += 1,
                RelocationStatus::SkippedMissing => summary.relocations_skipped_missing += 1,
                RelocationStatus::Failed => summary.relocations_failed += 1,
            }
        }
        summary
    }

    /// Relocation records in the order they were produced.
    pub fn relocation_records(&self) -> impl Iterator<Item = &RelocationRecord> {
        self.relocations.iter().map(|e| &e.record)
    }

    pub fn identity(&self, identity_id: &str) -> Option<&IdentityOutcome> {
        self.identities.iter().find(|i| i.identity_id == identity_id)
    }
}

/// What a real run would do for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunIdentity {
    pub identity_id: String,
    pub existing_containers: usize,
    /// Name a new container would get; `None` when one would be reused.
    pub would_create: Option<String>,
    pub owned_resources: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MigrationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

/// Output of a dry run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunReport {
    pub identities_total: usize,
    pub identities_selected: usize,
    pub identities: Vec<DryRunIdentity>,
    pub cancelled: bool,
}

//! Migration orchestrator.
//!
//! A run enumerates every identity, selects a bounded prefix (or an explicit
//! list) and processes the selection one identity at a time:
//!
//! - **Ownership sweep**: obtain a credential, find or create the identity's
//!   container, list its owned resources and re-parent them into the
//!   container one by one with a pacing delay between updates.
//! - **Relocation sweep**: for every resource the identity owns, or owned
//!   before it was re-parented into one of its containers, list its versions
//!   and branches and relocate each artifact from the legacy key to the
//!   canonical key.
//!
//! Failures are contained at the smallest unit that produced them and land
//! in the [`RunReport`]; only failing to enumerate identities ends the run.
//!
//! ## Cancellation
//!
//! A `watch` receiver set to `true` stops the run between units of work.
//! Calls already in flight complete. Identities not yet started are reported
//! as skipped and the report is marked `cancelled`.

use crate::error::{MigrationError, MigrationResult, Operation};
use crate::identities::{IdentitySource, DEFAULT_PAGE_SIZE};
use crate::keys::{ArtifactKeys, ArtifactKind, KeyLayout};
use crate::relocator::BlobRelocator;
use crate::report::{
    ContainerResolution, DryRunIdentity, DryRunReport, IdentityOutcome, IdentityStage,
    OwnershipOutcome, RelocationEntry, RelocationSweepOutcome, ResourceOutcome, RunReport,
    SubResourceFailure,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn, Instrument};
use wm_connectors::{
    BearerCredential, BlobStore, Identity, IdentityProvider, OwnedResource, ResourceClient,
    SubResource, SubResourceKind, TokenProvider,
};

/// Default delay between consecutive owner updates.
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);

/// Name of a new container when the identity has neither display name nor email.
pub const DEFAULT_CONTAINER_NAME: &str = "Personal";

/// Relocation order within a resource.
const SUB_RESOURCE_ORDER: [SubResourceKind; 2] = [SubResourceKind::Version, SubResourceKind::Branch];

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Process only the first `n` enumerated identities.
    pub identity_limit: Option<usize>,
    /// Identity provider page size.
    pub page_size: usize,
    /// Delay between consecutive owner updates of one identity.
    pub pacing: Duration,
    /// Artifacts of one resource relocated at once.
    pub relocation_concurrency: usize,
    /// Fallback name for new containers.
    pub default_container_name: String,
    /// Legacy and canonical key roots.
    pub key_layout: KeyLayout,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            identity_limit: None,
            page_size: DEFAULT_PAGE_SIZE,
            pacing: DEFAULT_PACING,
            relocation_concurrency: 1,
            default_container_name: DEFAULT_CONTAINER_NAME.to_string(),
            key_layout: KeyLayout::new("", ""),
        }
    }
}

/// Which sweeps a run performs and for whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub ownership: bool,
    pub relocation: bool,
    /// Explicit identity ids. Empty selects the bounded prefix.
    pub identities: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ownership: true,
            relocation: true,
            identities: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn ownership_only() -> Self {
        Self {
            relocation: false,
            ..Self::default()
        }
    }

    pub fn relocation_only(identities: Vec<String>) -> Self {
        Self {
            ownership: false,
            relocation: true,
            identities,
        }
    }
}

/// Picks the name of a new container: display name, then email, then `default`.
pub fn container_name(identity: &Identity, default: &str) -> String {
    [identity.display_name.as_deref(), identity.email.as_deref()]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// What the ownership sweep hands to the relocation sweep of the same identity.
struct OwnershipHandoff {
    container_id: String,
    resources: Vec<OwnedResource>,
}

struct RelocationJob {
    sub_resource: SubResource,
    artifact: ArtifactKind,
    keys: ArtifactKeys,
}

/// Drives migration runs.
pub struct MigrationOrchestrator {
    config: OrchestratorConfig,
    tokens: Arc<dyn TokenProvider>,
    identities: Arc<dyn IdentityProvider>,
    resources: Arc<dyn ResourceClient>,
    relocator: BlobRelocator,
    shutdown: Option<watch::Receiver<bool>>,
}

impl MigrationOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        tokens: Arc<dyn TokenProvider>,
        identities: Arc<dyn IdentityProvider>,
        resources: Arc<dyn ResourceClient>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            tokens,
            identities,
            resources,
            relocator: BlobRelocator::new(store),
            shutdown: None,
        }
    }

    /// Stops the run between units of work once `shutdown` reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for the pacing delay, waking early on cancellation.
    /// Returns true if the run was cancelled.
    async fn pace(&self) -> bool {
        if self.config.pacing.is_zero() {
            return self.is_cancelled();
        }
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(self.config.pacing) => {}
                    _ = async {
                        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                        // A dropped sender can never cancel.
                        if closed {
                            std::future::pending::<()>().await;
                        }
                    } => {}
                }
                self.is_cancelled()
            }
            None => {
                tokio::time::sleep(self.config.pacing).await;
                false
            }
        }
    }

    /// Enumerates every identity once. Returns the full list and the length
    /// of the prefix the identity limit selects.
    async fn select_identities(&self) -> MigrationResult<(Vec<Identity>, usize)> {
        let source = IdentitySource::new(self.identities.clone(), self.config.page_size);
        let identities = source.list_all().await?;
        let selected = self
            .config
            .identity_limit
            .map_or(identities.len(), |limit| limit.min(identities.len()));
        info!(
            total = identities.len(),
            selected,
            limit = ?self.config.identity_limit,
            "Selected identities"
        );
        Ok((identities, selected))
    }

    /// Runs the selected sweeps.
    ///
    /// Returns `Err` only when identities cannot be enumerated.
    pub async fn run(&self, options: RunOptions) -> MigrationResult<RunReport> {
        let (all, selected) = self.select_identities().await?;
        let total = all.len();

        // Explicit ids are looked up in the full enumerated set.
        let selection: Vec<Result<Identity, String>> = if options.identities.is_empty() {
            all.into_iter().take(selected).map(Ok).collect()
        } else {
            options
                .identities
                .iter()
                .map(|id| {
                    all.iter()
                        .find(|identity| &identity.id == id)
                        .cloned()
                        .ok_or_else(|| id.clone())
                })
                .collect()
        };

        let mut report = RunReport::new(total, selection.len());
        info!(
            run_id = %report.run_id,
            ownership = options.ownership,
            relocation = options.relocation,
            "Starting migration run"
        );

        let count = selection.len();
        for (index, entry) in selection.into_iter().enumerate() {
            if !report.cancelled && self.is_cancelled() {
                warn!(remaining = count - index, "Run cancelled");
                report.cancelled = true;
            }
            let identity = match entry {
                Ok(identity) => identity,
                Err(id) => {
                    warn!(identity_id = %id, "Requested identity not found");
                    report
                        .identities
                        .push(IdentityOutcome::failed(&id, MigrationError::UnknownIdentity(id.clone())));
                    continue;
                }
            };
            if report.cancelled {
                report.identities.push(IdentityOutcome::skipped(&identity.id));
                continue;
            }

            let span = wm_observability::identity_span!(identity.id);
            let outcome = self
                .process_identity(&identity, &options, &mut report)
                .instrument(span)
                .await;
            info!(
                identity_id = %identity.id,
                status = ?outcome.status,
                progress = %format!("{}/{}", index + 1, count),
                "Identity processed"
            );
            report.identities.push(outcome);
        }

        if self.is_cancelled() {
            report.cancelled = true;
        }
        report.finish();
        info!(run_id = %report.run_id, summary = ?report.summary, "Migration run finished");
        Ok(report)
    }

    async fn process_identity(
        &self,
        identity: &Identity,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> IdentityOutcome {
        let (ownership, handoff) = if options.ownership {
            let (outcome, handoff) = self.ownership_sweep(identity).await;
            (Some(outcome), handoff)
        } else {
            (None, None)
        };
        let relocation = if options.relocation {
            Some(self.relocation_sweep(identity, handoff, report).await)
        } else {
            None
        };
        IdentityOutcome::completed(&identity.id, ownership, relocation)
    }

    fn advance(outcome: &mut OwnershipOutcome, next: IdentityStage) {
        debug_assert!(
            outcome.stage.can_advance_to(next),
            "invalid transition {} -> {}",
            outcome.stage,
            next
        );
        debug!(from = %outcome.stage, to = %next, "Identity stage");
        outcome.stage = next;
    }

    /// Ownership sweep for one identity.
    pub async fn migrate_ownership(&self, identity: &Identity) -> OwnershipOutcome {
        self.ownership_sweep(identity).await.0
    }

    /// Ownership sweep. Once resources are listed, also returns them with the
    /// container they were moved into.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    async fn ownership_sweep(
        &self,
        identity: &Identity,
    ) -> (OwnershipOutcome, Option<OwnershipHandoff>) {
        let mut outcome = OwnershipOutcome::default();

        let credential = match self.tokens.get_token(&identity.id).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Could not obtain credential");
                outcome.error = Some(MigrationError::classify(Operation::Credential, &e));
                return (outcome, None);
            }
        };

        let container = match self.resolve_container(identity, &credential).await {
            Ok(container) => container,
            Err(e) => {
                warn!(error = %e, "Could not resolve container");
                outcome.error = Some(e);
                return (outcome, None);
            }
        };
        let container_id = container.container_id.clone();
        outcome.container = Some(container);
        Self::advance(&mut outcome, IdentityStage::ContainerResolved);

        let listed = match self
            .resources
            .list_owned_resources(&credential, &identity.id)
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "Could not list owned resources");
                outcome.error = Some(MigrationError::classify(Operation::IdentityCall, &e));
                return (outcome, None);
            }
        };
        if let Some(reason) = listed.malformed {
            warn!(%reason, "Malformed resource listing, treating as empty");
            outcome
                .warnings
                .push(MigrationError::MalformedResponse(reason));
        }
        Self::advance(&mut outcome, IdentityStage::ResourcesListed);
        let handoff = OwnershipHandoff {
            container_id: container_id.clone(),
            resources: listed.resources,
        };

        if handoff.resources.is_empty() {
            debug!("No owned resources");
            Self::advance(&mut outcome, IdentityStage::Done);
            return (outcome, Some(handoff));
        }

        let total = handoff.resources.len();
        info!(count = total, container_id = %container_id, "Updating resource owners");
        for (index, resource) in handoff.resources.iter().enumerate() {
            if index > 0 && self.pace().await {
                warn!(remaining = total - index, "Cancelled during resource updates");
                outcome.error = Some(MigrationError::Cancelled);
                return (outcome, Some(handoff));
            }
            match self
                .resources
                .update_resource_owner(&credential, &resource.id, &container_id)
                .await
            {
                Ok(()) => {
                    debug!(resource_id = %resource.id, "Resource re-parented");
                    outcome.resources.push(ResourceOutcome::updated(&resource.id));
                }
                Err(e) => {
                    warn!(resource_id = %resource.id, error = %e, "Resource update failed");
                    outcome.resources.push(ResourceOutcome::failed(
                        &resource.id,
                        MigrationError::classify(Operation::ResourceUpdate, &e),
                    ));
                }
            }
        }

        Self::advance(&mut outcome, IdentityStage::ResourcesUpdated);
        Self::advance(&mut outcome, IdentityStage::Done);
        (outcome, Some(handoff))
    }

    /// Finds the identity's container, creating one only when none exists.
    async fn resolve_container(
        &self,
        identity: &Identity,
        credential: &BearerCredential,
    ) -> MigrationResult<ContainerResolution> {
        let existing = self
            .resources
            .find_containers(credential, &identity.id)
            .await
            .map_err(|e| MigrationError::classify(Operation::IdentityCall, &e))?;

        if let Some(first) = existing.first() {
            if existing.len() > 1 {
                warn!(
                    count = existing.len(),
                    container_id = %first.id,
                    "Several containers found, reusing the first"
                );
            } else {
                debug!(container_id = %first.id, "Reusing existing container");
            }
            return Ok(ContainerResolution {
                container_id: first.id.clone(),
                name: first.name.clone(),
                created: false,
            });
        }

        let name = container_name(identity, &self.config.default_container_name);
        let created = self
            .resources
            .create_container(credential, &identity.id, &name)
            .await
            .map_err(|e| MigrationError::classify(Operation::IdentityCall, &e))?;
        info!(container_id = %created.id, name = %name, "Created container");
        Ok(ContainerResolution {
            container_id: created.id,
            name,
            created: true,
        })
    }

    /// Relocation sweep for one identity. Records go straight into `report`.
    pub async fn relocate_identity(
        &self,
        identity: &Identity,
        report: &mut RunReport,
    ) -> RelocationSweepOutcome {
        self.relocation_sweep(identity, None, report).await
    }

    #[instrument(skip(self, identity, handoff, report), fields(identity_id = %identity.id))]
    async fn relocation_sweep(
        &self,
        identity: &Identity,
        handoff: Option<OwnershipHandoff>,
        report: &mut RunReport,
    ) -> RelocationSweepOutcome {
        let mut outcome = RelocationSweepOutcome::default();

        let credential = match self.tokens.get_token(&identity.id).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Could not obtain credential for relocation");
                outcome.error = Some(MigrationError::classify(Operation::Credential, &e));
                return outcome;
            }
        };

        let resources = match self
            .resources_to_relocate(identity, &credential, handoff, &mut outcome.warnings)
            .await
        {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Could not list resources for relocation");
                outcome.error = Some(e);
                return outcome;
            }
        };

        for resource in &resources {
            if self.is_cancelled() {
                outcome.error = Some(MigrationError::Cancelled);
                return outcome;
            }
            outcome.resources += 1;

            for kind in SUB_RESOURCE_ORDER {
                let sub_resources = match self
                    .resources
                    .list_sub_resources(&credential, kind, &resource.id)
                    .await
                {
                    Ok(sub_resources) => sub_resources,
                    Err(e) => {
                        warn!(resource_id = %resource.id, %kind, error = %e, "Could not list sub-resources");
                        report.sub_resource_failures.push(SubResourceFailure {
                            identity_id: identity.id.clone(),
                            resource_id: resource.id.clone(),
                            kind,
                            error: MigrationError::classify(Operation::IdentityCall, &e),
                        });
                        continue;
                    }
                };

                // Legacy keys are namespaced by the identity that owned the resource.
                let jobs: Vec<RelocationJob> = sub_resources
                    .into_iter()
                    .flat_map(|sub_resource| {
                        ArtifactKind::for_sub_resource(kind)
                            .iter()
                            .map(|artifact| RelocationJob {
                                keys: self.config.key_layout.keys(
                                    *artifact,
                                    &identity.id,
                                    &resource.id,
                                    &sub_resource.id,
                                ),
                                artifact: *artifact,
                                sub_resource: sub_resource.clone(),
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect();

                let expected = jobs.len();
                let entries = self
                    .relocate_jobs(&identity.id, jobs)
                    .instrument(wm_observability::resource_span!(resource.id, identity.id))
                    .await;
                outcome.artifacts += entries.len();
                let finished = entries.len() == expected;
                report.relocations.extend(entries);
                if !finished {
                    outcome.error = Some(MigrationError::Cancelled);
                    return outcome;
                }
            }
        }

        debug!(
            resources = outcome.resources,
            artifacts = outcome.artifacts,
            "Relocation sweep finished"
        );
        outcome
    }

    /// Resources still listed under the identity, followed by those already
    /// re-parented into its containers, each once.
    async fn resources_to_relocate(
        &self,
        identity: &Identity,
        credential: &BearerCredential,
        handoff: Option<OwnershipHandoff>,
        warnings: &mut Vec<MigrationError>,
    ) -> MigrationResult<Vec<OwnedResource>> {
        let (mut resources, container_ids) = match handoff {
            Some(handoff) => (handoff.resources, vec![handoff.container_id]),
            None => {
                let listed = self.list_resources(credential, &identity.id, warnings).await?;
                let containers = self
                    .resources
                    .find_containers(credential, &identity.id)
                    .await
                    .map_err(|e| MigrationError::classify(Operation::IdentityCall, &e))?;
                (listed, containers.into_iter().map(|c| c.id).collect())
            }
        };

        for container_id in container_ids {
            for resource in self.list_resources(credential, &container_id, warnings).await? {
                if !resources.iter().any(|r| r.id == resource.id) {
                    resources.push(resource);
                }
            }
        }
        Ok(resources)
    }

    /// Lists resources of `owner_id`; a malformed listing is empty plus a warning.
    async fn list_resources(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
        warnings: &mut Vec<MigrationError>,
    ) -> MigrationResult<Vec<OwnedResource>> {
        let listed = self
            .resources
            .list_owned_resources(credential, owner_id)
            .await
            .map_err(|e| MigrationError::classify(Operation::IdentityCall, &e))?;
        if let Some(reason) = listed.malformed {
            warn!(owner_id, %reason, "Malformed resource listing, treating as empty");
            warnings.push(MigrationError::MalformedResponse(reason));
        }
        Ok(listed.resources)
    }

    /// Relocates up to `relocation_concurrency` artifacts at once, keeping
    /// job order. Stops taking new jobs once cancelled.
    async fn relocate_jobs(&self, identity_id: &str, jobs: Vec<RelocationJob>) -> Vec<RelocationEntry> {
        let relocator = &self.relocator;
        stream::iter(jobs)
            .take_while(|_| futures::future::ready(!self.is_cancelled()))
            .map(|job| async move {
                let record = relocator
                    .relocate(&job.keys.old_key, &job.keys.new_key, job.keys.content_type)
                    .await;
                RelocationEntry {
                    identity_id: identity_id.to_string(),
                    resource_id: job.sub_resource.resource_id,
                    sub_resource: job.sub_resource.kind,
                    sub_resource_id: job.sub_resource.id,
                    artifact: job.artifact,
                    record,
                }
            })
            .buffered(self.config.relocation_concurrency.max(1))
            .collect()
            .await
    }

    /// Reports what a run would do, without any mutating call.
    pub async fn dry_run(&self) -> MigrationResult<DryRunReport> {
        let (all, selected) = self.select_identities().await?;
        let mut report = DryRunReport {
            identities_total: all.len(),
            identities_selected: selected,
            identities: Vec::with_capacity(selected),
            cancelled: false,
        };

        for identity in all.iter().take(selected) {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let planned = self
                .plan_identity(identity)
                .instrument(wm_observability::identity_span!(identity.id, dry_run = true))
                .await;
            info!(
                identity_id = %identity.id,
                containers = planned.existing_containers,
                resources = planned.owned_resources,
                "Would process identity"
            );
            report.identities.push(planned);
        }
        Ok(report)
    }

    async fn plan_identity(&self, identity: &Identity) -> DryRunIdentity {
        let mut planned = DryRunIdentity {
            identity_id: identity.id.clone(),
            existing_containers: 0,
            would_create: None,
            owned_resources: 0,
            warnings: Vec::new(),
            error: None,
        };

        let credential = match self.tokens.get_token(&identity.id).await {
            Ok(credential) => credential,
            Err(e) => {
                planned.error = Some(MigrationError::classify(Operation::Credential, &e));
                return planned;
            }
        };

        match self.resources.find_containers(&credential, &identity.id).await {
            Ok(containers) => {
                planned.existing_containers = containers.len();
                if containers.is_empty() {
                    planned.would_create = Some(container_name(
                        identity,
                        &self.config.default_container_name,
                    ));
                }
            }
            Err(e) => {
                planned.error = Some(MigrationError::classify(Operation::IdentityCall, &e));
                return planned;
            }
        }

        match self
            .resources
            .list_owned_resources(&credential, &identity.id)
            .await
        {
            Ok(listed) => {
                planned.owned_resources = listed.resources.len();
                if let Some(reason) = listed.malformed {
                    planned
                        .warnings
                        .push(MigrationError::MalformedResponse(reason));
                }
            }
            Err(e) => {
                planned.error = Some(MigrationError::classify(Operation::IdentityCall, &e));
            }
        }
        planned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{IdentityStatus, ResourceStatus};
    use crate::relocator::RelocationStatus;
    use wm_connectors::testing::{sample_identities, sample_identity, sample_resource};
    use wm_connectors::{
        Container, MockBlobStore, MockIdentityProvider, MockResourceClient, MockTokenProvider,
    };

    struct Harness {
        tokens: Arc<MockTokenProvider>,
        identities: Arc<MockIdentityProvider>,
        resources: Arc<MockResourceClient>,
        store: Arc<MockBlobStore>,
    }

    impl Harness {
        fn new(identities: Vec<Identity>) -> Self {
            Self {
                tokens: Arc::new(MockTokenProvider::new("tokens")),
                identities: Arc::new(MockIdentityProvider::paged("identities", identities, 2)),
                resources: Arc::new(MockResourceClient::new("resources")),
                store: Arc::new(MockBlobStore::new("store")),
            }
        }

        fn orchestrator(&self, config: OrchestratorConfig) -> MigrationOrchestrator {
            MigrationOrchestrator::new(
                config,
                self.tokens.clone(),
                self.identities.clone(),
                self.resources.clone(),
                self.store.clone(),
            )
        }
    }

    fn quick_config() -> OrchestratorConfig {
        OrchestratorConfig {
            pacing: Duration::ZERO,
            key_layout: KeyLayout::new("legacy", "canonical"),
            ..Default::default()
        }
    }

    #[test]
    fn test_container_name_fallback() {
        let mut identity = sample_identity("u-1");
        assert_eq!(container_name(&identity, "Personal"), "User u-1");

        identity.display_name = Some("   ".into());
        assert_eq!(container_name(&identity, "Personal"), "u-1@example.com");

        identity.email = None;
        assert_eq!(container_name(&identity, "Personal"), "Personal");
    }

    #[tokio::test]
    async fn test_reuses_first_existing_container() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        for id in ["ws-a", "ws-b"] {
            harness
                .resources
                .add_container(Container {
                    id: id.into(),
                    owner_id: "u-1".into(),
                    name: id.into(),
                })
                .await;
        }
        let orchestrator = harness.orchestrator(quick_config());

        let outcome = orchestrator
            .migrate_ownership(&sample_identity("u-1"))
            .await;
        let container = outcome.container.unwrap();
        assert_eq!(container.container_id, "ws-a");
        assert!(!container.created);
        assert_eq!(harness.resources.mutating_call_count().await, 0);
        assert_eq!(outcome.stage, IdentityStage::Done);
    }

    #[tokio::test]
    async fn test_auth_failure_fails_only_that_identity() {
        let harness = Harness::new(sample_identities(3));
        harness.tokens.fail_identity("user-0001").await;
        let orchestrator = harness.orchestrator(quick_config());

        let report = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
        assert_eq!(report.summary.identities_processed, 2);
        assert_eq!(report.summary.identities_failed, 1);

        let failed = report.identity("user-0001").unwrap();
        assert_eq!(failed.status, IdentityStatus::Failed);
        let ownership = failed.ownership.as_ref().unwrap();
        assert_eq!(ownership.stage, IdentityStage::Start);
        assert!(matches!(ownership.error, Some(MigrationError::Auth(_))));
    }

    #[tokio::test]
    async fn test_list_failure_stops_identity_after_container() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.fail_list_resources("u-1").await;
        let orchestrator = harness.orchestrator(quick_config());

        let outcome = orchestrator.migrate_ownership(&sample_identity("u-1")).await;
        assert_eq!(outcome.stage, IdentityStage::ContainerResolved);
        assert!(matches!(outcome.error, Some(MigrationError::TransientApi(_))));
    }

    #[tokio::test]
    async fn test_malformed_listing_is_warning() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.malformed_list_resources("u-1").await;
        let orchestrator = harness.orchestrator(quick_config());

        let outcome = orchestrator.migrate_ownership(&sample_identity("u-1")).await;
        assert_eq!(outcome.stage, IdentityStage::Done);
        assert!(outcome.error.is_none());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [MigrationError::MalformedResponse(_)]
        ));
    }

    #[tokio::test]
    async fn test_identity_limit_selects_prefix() {
        let harness = Harness::new(sample_identities(5));
        let orchestrator = harness.orchestrator(OrchestratorConfig {
            identity_limit: Some(2),
            ..quick_config()
        });

        let report = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
        assert_eq!(report.identities_total, 5);
        assert_eq!(report.identities_selected, 2);
        let ids: Vec<_> = report.identities.iter().map(|i| i.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["user-0000", "user-0001"]);
    }

    #[tokio::test]
    async fn test_relocation_sweep_orders_versions_then_branches() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.add_resource(sample_resource("p-1", "u-1")).await;
        harness
            .resources
            .set_sub_resources(SubResourceKind::Branch, "p-1", &["main"])
            .await;
        harness
            .resources
            .set_sub_resources(SubResourceKind::Version, "p-1", &["1"])
            .await;
        harness
            .store
            .insert("legacy/u-1/p-1/functions/functions_v1.js", "v1")
            .await;
        let orchestrator = harness.orchestrator(quick_config());

        let report = orchestrator
            .run(RunOptions::relocation_only(Vec::new()))
            .await
            .unwrap();
        let records: Vec<_> = report
            .relocation_records()
            .map(|r| (r.new_key.as_str(), r.status))
            .collect();
        assert_eq!(
            records,
            vec![
                ("canonical/p-1/versions/1/functions.js", RelocationStatus::Migrated),
                ("canonical/p-1/versions/1/appconfig.json", RelocationStatus::SkippedMissing),
                ("canonical/p-1/branches/main/function.js", RelocationStatus::SkippedMissing),
            ]
        );
        assert_eq!(harness.resources.mutating_call_count().await, 0);
    }

    #[tokio::test]
    async fn test_sub_resource_listing_failure_continues() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.add_resource(sample_resource("p-1", "u-1")).await;
        harness.resources.add_resource(sample_resource("p-2", "u-1")).await;
        harness
            .resources
            .fail_sub_resources(SubResourceKind::Version, "p-1")
            .await;
        harness
            .resources
            .set_sub_resources(SubResourceKind::Branch, "p-1", &["main"])
            .await;
        harness
            .resources
            .set_sub_resources(SubResourceKind::Branch, "p-2", &["dev"])
            .await;
        let orchestrator = harness.orchestrator(quick_config());

        let report = orchestrator
            .run(RunOptions::relocation_only(Vec::new()))
            .await
            .unwrap();
        assert_eq!(report.sub_resource_failures.len(), 1);
        assert_eq!(report.sub_resource_failures[0].kind, SubResourceKind::Version);
        assert_eq!(report.relocations.len(), 2);
        assert_eq!(report.identities[0].status, IdentityStatus::Done);
    }

    #[tokio::test]
    async fn test_explicit_identities_and_unknown_ids() {
        let harness = Harness::new(sample_identities(4));
        let orchestrator = harness.orchestrator(OrchestratorConfig {
            identity_limit: Some(1),
            ..quick_config()
        });

        let report = orchestrator
            .run(RunOptions::relocation_only(vec![
                "user-0003".into(),
                "ghost".into(),
            ]))
            .await
            .unwrap();
        assert_eq!(report.identities.len(), 2);
        assert_eq!(report.identities[0].status, IdentityStatus::Done);
        assert!(matches!(
            report.identities[1].error,
            Some(MigrationError::UnknownIdentity(_))
        ));
        // One pass over both pages, even though the limit leaves user-0003 out.
        assert_eq!(harness.identities.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_relocation_listing_counts_as_warning() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.malformed_list_resources("u-1").await;
        let orchestrator = harness.orchestrator(quick_config());

        let report = orchestrator
            .run(RunOptions::relocation_only(Vec::new()))
            .await
            .unwrap();
        let identity = report.identity("u-1").unwrap();
        assert_eq!(identity.status, IdentityStatus::Done);
        let relocation = identity.relocation.as_ref().unwrap();
        assert!(matches!(
            relocation.warnings.as_slice(),
            [MigrationError::MalformedResponse(_)]
        ));
        assert_eq!(report.summary.warnings, 1);
    }

    #[tokio::test]
    async fn test_relocation_follows_resources_into_container() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.add_resource(sample_resource("p-1", "u-1")).await;
        harness
            .resources
            .set_sub_resources(SubResourceKind::Branch, "p-1", &["main"])
            .await;
        harness
            .store
            .insert("legacy/u-1/p-1/functions/main.js", "main")
            .await;
        let orchestrator = harness.orchestrator(quick_config());

        let ownership = orchestrator.migrate_ownership(&sample_identity("u-1")).await;
        let container_id = ownership.container.unwrap().container_id;
        assert_eq!(
            harness.resources.resource_owner("p-1").await.as_deref(),
            Some(container_id.as_str())
        );

        let mut report = RunReport::new(1, 1);
        let relocation = orchestrator
            .relocate_identity(&sample_identity("u-1"), &mut report)
            .await;
        assert!(relocation.error.is_none());
        assert_eq!(relocation.resources, 1);
        let records: Vec<_> = report
            .relocation_records()
            .map(|r| (r.new_key.as_str(), r.status))
            .collect();
        assert_eq!(
            records,
            vec![("canonical/p-1/branches/main/function.js", RelocationStatus::Migrated)]
        );
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_mutating_calls() {
        let harness = Harness::new(sample_identities(2));
        harness
            .resources
            .add_resource(sample_resource("p-1", "user-0000"))
            .await;
        harness
            .resources
            .add_container(Container {
                id: "ws-9".into(),
                owner_id: "user-0001".into(),
                name: "Existing".into(),
            })
            .await;
        let orchestrator = harness.orchestrator(quick_config());

        let report = orchestrator.dry_run().await.unwrap();
        assert_eq!(report.identities.len(), 2);
        assert_eq!(report.identities[0].owned_resources, 1);
        assert_eq!(
            report.identities[0].would_create.as_deref(),
            Some("User user-0000")
        );
        assert_eq!(report.identities[1].existing_containers, 1);
        assert!(report.identities[1].would_create.is_none());
        assert_eq!(harness.resources.mutating_call_count().await, 0);
        assert_eq!(harness.store.put_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everyone() {
        let harness = Harness::new(sample_identities(3));
        let (tx, rx) = watch::channel(false);
        let orchestrator = harness.orchestrator(quick_config()).with_shutdown(rx);
        tx.send(true).unwrap();

        let report = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.summary.identities_skipped, 3);
        assert!(harness.tokens.requests().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pacing_stops_updates() {
        let harness = Harness::new(vec![sample_identity("u-1"), sample_identity("u-2")]);
        for id in ["p-1", "p-2", "p-3"] {
            harness.resources.add_resource(sample_resource(id, "u-1")).await;
        }
        let (tx, rx) = watch::channel(false);
        let orchestrator = harness
            .orchestrator(OrchestratorConfig {
                pacing: Duration::from_secs(5),
                ..quick_config()
            })
            .with_shutdown(rx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).ok();
            tx
        });
        let report = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
        drop(canceller.await);

        assert!(report.cancelled);
        let first = report.identity("u-1").unwrap();
        let ownership = first.ownership.as_ref().unwrap();
        assert_eq!(ownership.resources.len(), 1);
        assert_eq!(ownership.resources[0].status, ResourceStatus::Updated);
        assert!(matches!(ownership.error, Some(MigrationError::Cancelled)));
        assert_eq!(report.identity("u-2").unwrap().status, IdentityStatus::Skipped);
    }

    #[tokio::test]
    async fn test_parallel_relocation_keeps_order() {
        let harness = Harness::new(vec![sample_identity("u-1")]);
        harness.resources.add_resource(sample_resource("p-1", "u-1")).await;
        let branches = ["a", "b", "c", "d", "e"];
        harness
            .resources
            .set_sub_resources(SubResourceKind::Branch, "p-1", &branches)
            .await;
        for branch in branches {
            harness
                .store
                .insert(&format!("legacy/u-1/p-1/functions/{}.js", branch), branch)
                .await;
        }
        let orchestrator = harness.orchestrator(OrchestratorConfig {
            relocation_concurrency: 4,
            ..quick_config()
        });

        let report = orchestrator
            .run(RunOptions::relocation_only(Vec::new()))
            .await
            .unwrap();
        let ids: Vec<_> = report
            .relocations
            .iter()
            .map(|e| e.sub_resource_id.as_str())
            .collect();
        assert_eq!(ids, branches);
        assert_eq!(report.summary.relocations_migrated, 5);
        assert_eq!(harness.store.put_count().await, 5);
    }
}

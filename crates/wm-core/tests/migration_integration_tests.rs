//! Integration tests for full migration runs.
//!
//! These drive the orchestrator against the in-memory connectors and check
//! the properties a re-runnable migration relies on: find-before-create,
//! head-before-put, failure containment and complete enumeration.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use wm_connectors::storage::BlobOp;
use wm_connectors::testing::{sample_identities, sample_identity, sample_resource};
use wm_connectors::{
    Identity, MockBlobStore, MockIdentityProvider, MockResourceClient, MockTokenProvider,
    SubResourceKind,
};
use wm_core::{
    IdentitySource, IdentityStatus, KeyLayout, MigrationError, MigrationOrchestrator,
    OrchestratorConfig, RelocationStatus, ResourceStatus, RunOptions,
};

struct TestEnv {
    tokens: Arc<MockTokenProvider>,
    identities: Arc<MockIdentityProvider>,
    resources: Arc<MockResourceClient>,
    store: Arc<MockBlobStore>,
}

impl TestEnv {
    fn new(identities: Vec<Identity>) -> Self {
        Self {
            tokens: Arc::new(MockTokenProvider::new("tokens")),
            identities: Arc::new(MockIdentityProvider::paged("identities", identities, 1000)),
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

fn config(pacing: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        pacing,
        key_layout: KeyLayout::new("public", "public"),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_container_resolution_is_idempotent() {
    let env = TestEnv::new(sample_identities(3));
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let first = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
    let second = orchestrator.run(RunOptions::ownership_only()).await.unwrap();

    assert_eq!(first.summary.containers_created, 3);
    assert_eq!(second.summary.containers_created, 0);
    assert_eq!(second.summary.containers_reused, 3);
    for identity in sample_identities(3) {
        assert_eq!(env.resources.containers_for(&identity.id).await.len(), 1);
    }
}

#[tokio::test]
async fn test_relocation_is_idempotent_across_runs() {
    let env = TestEnv::new(vec![sample_identity("u-1")]);
    env.resources.add_resource(sample_resource("p-1", "u-1")).await;
    env.resources
        .set_sub_resources(SubResourceKind::Version, "p-1", &["2"])
        .await;
    env.store
        .insert("public/u-1/p-1/functions/functions_v2.js", "fn v2")
        .await;
    env.store
        .insert("public/u-1/p-1/appconfig/appconfig_v2.json", "{\"v\":2}")
        .await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let first = orchestrator
        .run(RunOptions::relocation_only(Vec::new()))
        .await
        .unwrap();
    assert_eq!(first.summary.relocations_migrated, 2);

    let second = orchestrator
        .run(RunOptions::relocation_only(Vec::new()))
        .await
        .unwrap();
    assert_eq!(second.summary.relocations_skipped_exists, 2);
    assert_eq!(env.store.put_count().await, 2);

    let functions = env
        .store
        .object("public/p-1/versions/2/functions.js")
        .await
        .unwrap();
    assert_eq!(functions.body, Bytes::from("fn v2"));
    assert_eq!(functions.content_type.as_deref(), Some("application/javascript"));
    let appconfig = env
        .store
        .object("public/p-1/versions/2/appconfig.json")
        .await
        .unwrap();
    assert_eq!(appconfig.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_failed_update_is_isolated() {
    let env = TestEnv::new(vec![sample_identity("u-1")]);
    for id in ["p-1", "p-2", "p-3", "p-4"] {
        env.resources.add_resource(sample_resource(id, "u-1")).await;
    }
    env.resources.fail_update("p-2").await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let report = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
    assert_eq!(report.summary.resources_updated, 3);
    assert_eq!(report.summary.resources_failed, 1);

    let identity = report.identity("u-1").unwrap();
    assert_eq!(identity.status, IdentityStatus::Done);
    let outcomes = &identity.ownership.as_ref().unwrap().resources;
    assert_eq!(outcomes[1].resource_id, "p-2");
    assert_eq!(outcomes[1].status, ResourceStatus::Failed);
    assert!(matches!(
        outcomes[1].error,
        Some(MigrationError::ResourceUpdate(_))
    ));

    let container_id = &identity
        .ownership
        .as_ref()
        .unwrap()
        .container
        .as_ref()
        .unwrap()
        .container_id;
    for id in ["p-1", "p-3", "p-4"] {
        assert_eq!(env.resources.resource_owner(id).await.as_ref(), Some(container_id));
    }
    assert!(env.resources.resource_owner("p-2").await.is_none());
}

#[tokio::test]
async fn test_one_identity_failure_does_not_touch_others() {
    let env = TestEnv::new(sample_identities(3));
    env.resources
        .add_resource(sample_resource("p-a", "user-0000"))
        .await;
    env.resources
        .add_resource(sample_resource("p-c", "user-0002"))
        .await;
    env.resources.fail_find_containers("user-0001").await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let report = orchestrator.run(RunOptions::ownership_only()).await.unwrap();
    assert_eq!(report.summary.identities_processed, 2);
    assert_eq!(report.summary.identities_failed, 1);
    assert_eq!(report.summary.resources_updated, 2);
    assert!(matches!(
        report.identity("user-0001").unwrap().ownership.as_ref().unwrap().error,
        Some(MigrationError::TransientApi(_))
    ));
}

#[tokio::test]
async fn test_pagination_completeness() {
    let provider = Arc::new(MockIdentityProvider::paged(
        "identities",
        sample_identities(2437),
        1000,
    ));
    let source = IdentitySource::new(provider.clone(), 1000);

    let identities = source.list_all().await.unwrap();
    assert_eq!(identities.len(), 2437);
    let unique: std::collections::HashSet<_> = identities.iter().map(|i| &i.id).collect();
    assert_eq!(unique.len(), 2437);

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].1, None);
    assert_eq!(requests[2].1.as_deref(), Some("page-2"));
}

#[tokio::test]
async fn test_enumeration_failure_is_fatal() {
    let env = TestEnv::new(sample_identities(1500));
    env.identities.fail_on_page(1).await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let result = orchestrator.run(RunOptions::default()).await;
    assert!(matches!(result, Err(MigrationError::Enumeration(_))));
    assert!(env.tokens.requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_two_resources_without_container() {
    let env = TestEnv::new(vec![sample_identity("U")]);
    env.resources.add_resource(sample_resource("p-1", "U")).await;
    env.resources.add_resource(sample_resource("p-2", "U")).await;
    env.resources
        .set_sub_resources(SubResourceKind::Version, "p-1", &["1"])
        .await;
    env.resources
        .set_sub_resources(SubResourceKind::Branch, "p-2", &["main"])
        .await;
    env.store
        .insert("public/U/p-2/functions/main.js", "legacy")
        .await;
    env.store
        .insert("public/p-2/branches/main/function.js", "canonical")
        .await;
    let orchestrator = env.orchestrator(config(Duration::from_millis(200)));

    let report = orchestrator.run(RunOptions::default()).await.unwrap();

    // One container, created once.
    assert_eq!(env.resources.containers_for("U").await.len(), 1);
    assert_eq!(report.summary.containers_created, 1);

    // Two sequential updates with the pacing delay between them.
    let updates = env.resources.update_calls().await;
    assert_eq!(updates.len(), 2);
    assert!(updates[1].at.duration_since(updates[0].at) >= Duration::from_millis(200));
    assert_eq!(report.summary.resources_updated, 2);
    assert_eq!(report.summary.resources_failed, 0);

    let version = report
        .relocations
        .iter()
        .find(|e| e.record.new_key == "public/p-1/versions/1/functions.js")
        .unwrap();
    assert_eq!(version.record.status, RelocationStatus::SkippedMissing);

    let branch = report
        .relocations
        .iter()
        .find(|e| e.record.new_key == "public/p-2/branches/main/function.js")
        .unwrap();
    assert_eq!(branch.record.status, RelocationStatus::SkippedExists);

    let calls = env.store.calls().await;
    assert!(!calls.contains(&(BlobOp::Get, "public/U/p-2/functions/main.js".to_string())));
    assert_eq!(env.store.put_count().await, 0);
    assert_eq!(
        env.store
            .object("public/p-2/branches/main/function.js")
            .await
            .unwrap()
            .body,
        Bytes::from("canonical")
    );
    assert!(!report.cancelled);
}

#[tokio::test]
async fn test_default_run_relocates_reparented_resources() {
    let env = TestEnv::new(vec![sample_identity("U")]);
    env.resources.add_resource(sample_resource("p-1", "U")).await;
    env.resources
        .set_sub_resources(SubResourceKind::Branch, "p-1", &["main"])
        .await;
    env.store
        .insert("public/U/p-1/functions/main.js", "legacy")
        .await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let report = orchestrator.run(RunOptions::default()).await.unwrap();

    assert_eq!(report.summary.resources_updated, 1);
    assert_eq!(report.summary.relocations_migrated, 1);
    assert_eq!(env.store.put_count().await, 1);
    assert_eq!(
        env.store
            .object("public/p-1/branches/main/function.js")
            .await
            .unwrap()
            .body,
        Bytes::from("legacy")
    );
    let relocation = report.identity("U").unwrap().relocation.as_ref().unwrap();
    assert_eq!(relocation.resources, 1);
}

#[tokio::test]
async fn test_relocation_after_ownership_run_finds_container_resources() {
    let env = TestEnv::new(vec![sample_identity("U")]);
    env.resources.add_resource(sample_resource("p-1", "U")).await;
    env.resources
        .set_sub_resources(SubResourceKind::Version, "p-1", &["4"])
        .await;
    env.store
        .insert("public/U/p-1/functions/functions_v4.js", "fn v4")
        .await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    orchestrator.run(RunOptions::ownership_only()).await.unwrap();
    let report = orchestrator
        .run(RunOptions::relocation_only(Vec::new()))
        .await
        .unwrap();

    assert_eq!(report.summary.relocations_migrated, 1);
    assert_eq!(report.summary.relocations_skipped_missing, 1);
    assert!(env
        .store
        .object("public/p-1/versions/4/functions.js")
        .await
        .is_some());
}

#[tokio::test]
async fn test_failed_put_leaves_other_artifacts_alone() {
    let env = TestEnv::new(vec![sample_identity("U")]);
    env.resources.add_resource(sample_resource("p-1", "U")).await;
    env.resources
        .set_sub_resources(SubResourceKind::Version, "p-1", &["3"])
        .await;
    env.resources
        .set_sub_resources(SubResourceKind::Branch, "p-1", &["main"])
        .await;
    env.store
        .insert("public/U/p-1/functions/functions_v3.js", "fn v3")
        .await;
    env.store
        .insert("public/U/p-1/appconfig/appconfig_v3.json", "{\"v\":3}")
        .await;
    env.store
        .insert("public/U/p-1/functions/main.js", "main")
        .await;
    env.store
        .fail(BlobOp::Put, "public/p-1/versions/3/functions.js")
        .await;
    let orchestrator = env.orchestrator(config(Duration::ZERO));

    let report = orchestrator
        .run(RunOptions::relocation_only(Vec::new()))
        .await
        .unwrap();

    let status_of = |key: &str| {
        report
            .relocation_records()
            .find(|r| r.new_key == key)
            .map(|r| r.status)
    };
    assert_eq!(
        status_of("public/p-1/versions/3/functions.js"),
        Some(RelocationStatus::Failed)
    );
    assert_eq!(
        status_of("public/p-1/versions/3/appconfig.json"),
        Some(RelocationStatus::Migrated)
    );
    assert_eq!(
        status_of("public/p-1/branches/main/function.js"),
        Some(RelocationStatus::Migrated)
    );
    assert_eq!(report.summary.relocations_failed, 1);
    assert_eq!(report.summary.relocations_migrated, 2);
    assert_eq!(report.identity("U").unwrap().status, IdentityStatus::Done);
    assert!(env
        .store
        .object("public/p-1/versions/3/functions.js")
        .await
        .is_none());
}

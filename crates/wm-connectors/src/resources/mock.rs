//! Mock resource API for testing.
//!
//! An owner update moves the resource under its new owner, the way the real
//! API reports it afterwards: the identity stops listing it and the
//! container starts to. Repeated updates converge on the same state.

use crate::traits::{
    BearerCredential, Connector, ConnectorError, ConnectorHealth, ConnectorResult, Container,
    OwnedResource, OwnedResourceList, ResourceClient, SubResource, SubResourceKind,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall {
    FindContainers { owner_id: String },
    CreateContainer { owner_id: String, name: String },
    ListOwnedResources { owner_id: String },
    UpdateResourceOwner { resource_id: String, new_owner_id: String },
    ListSubResources { kind: SubResourceKind, resource_id: String },
}

impl ResourceCall {
    /// True for calls that change server state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ResourceCall::CreateContainer { .. } | ResourceCall::UpdateResourceOwner { .. }
        )
    }
}

/// A recorded call with the credential it carried and when it arrived.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: ResourceCall,
    pub token: String,
    pub at: Instant,
}

#[derive(Default)]
struct Failures {
    find: HashSet<String>,
    create: HashSet<String>,
    list: HashSet<String>,
    malformed: HashSet<String>,
    update: HashSet<String>,
    sub_resources: HashSet<(SubResourceKind, String)>,
}

/// In-memory [`ResourceClient`].
pub struct MockResourceClient {
    name: String,
    containers: Arc<RwLock<HashMap<String, Vec<Container>>>>,
    resources: Arc<RwLock<HashMap<String, Vec<OwnedResource>>>>,
    assignments: Arc<RwLock<HashMap<String, String>>>,
    sub_resources: Arc<RwLock<HashMap<(SubResourceKind, String), Vec<SubResource>>>>,
    failures: Arc<RwLock<Failures>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    next_id: AtomicU64,
}

impl MockResourceClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            containers: Arc::new(RwLock::new(HashMap::new())),
            resources: Arc::new(RwLock::new(HashMap::new())),
            assignments: Arc::new(RwLock::new(HashMap::new())),
            sub_resources: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(Failures::default())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seeds an existing container.
    pub async fn add_container(&self, container: Container) {
        self.containers
            .write()
            .await
            .entry(container.owner_id.clone())
            .or_default()
            .push(container);
    }

    /// Seeds a resource listed under its `owner_id`.
    pub async fn add_resource(&self, resource: OwnedResource) {
        self.resources
            .write()
            .await
            .entry(resource.owner_id.clone())
            .or_default()
            .push(resource);
    }

    /// Seeds branches or versions of a resource.
    pub async fn set_sub_resources(&self, kind: SubResourceKind, resource_id: &str, ids: &[&str]) {
        let entries = ids
            .iter()
            .map(|id| SubResource {
                kind,
                resource_id: resource_id.to_string(),
                id: id.to_string(),
            })
            .collect();
        self.sub_resources
            .write()
            .await
            .insert((kind, resource_id.to_string()), entries);
    }

    pub async fn fail_find_containers(&self, owner_id: &str) {
        self.failures.write().await.find.insert(owner_id.to_string());
    }

    pub async fn fail_create_container(&self, owner_id: &str) {
        self.failures.write().await.create.insert(owner_id.to_string());
    }

    pub async fn fail_list_resources(&self, owner_id: &str) {
        self.failures.write().await.list.insert(owner_id.to_string());
    }

    /// Makes the resource listing for `owner_id` come back malformed.
    pub async fn malformed_list_resources(&self, owner_id: &str) {
        self.failures
            .write()
            .await
            .malformed
            .insert(owner_id.to_string());
    }

    pub async fn fail_update(&self, resource_id: &str) {
        self.failures
            .write()
            .await
            .update
            .insert(resource_id.to_string());
    }

    pub async fn fail_sub_resources(&self, kind: SubResourceKind, resource_id: &str) {
        self.failures
            .write()
            .await
            .sub_resources
            .insert((kind, resource_id.to_string()));
    }

    /// Containers currently owned by `owner_id`.
    pub async fn containers_for(&self, owner_id: &str) -> Vec<Container> {
        self.containers
            .read()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The container a resource was last re-parented into.
    pub async fn resource_owner(&self, resource_id: &str) -> Option<String> {
        self.assignments.read().await.get(resource_id).cloned()
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Recorded update calls, in arrival order.
    pub async fn update_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| matches!(c.call, ResourceCall::UpdateResourceOwner { .. }))
            .cloned()
            .collect()
    }

    pub async fn mutating_call_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.call.is_mutating())
            .count()
    }

    async fn record(&self, credential: &BearerCredential, call: ResourceCall) {
        self.calls.write().await.push(RecordedCall {
            call,
            token: credential.token().expose_secret().to_string(),
            at: Instant::now(),
        });
    }
}

fn unavailable(what: &str) -> ConnectorError {
    ConnectorError::RequestFailed(format!("Mock {} failed: 503 Service Unavailable", what))
}

#[async_trait]
impl Connector for MockResourceClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "resources"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        Ok(ConnectorHealth::Healthy)
    }
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn find_containers(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<Vec<Container>> {
        self.record(
            credential,
            ResourceCall::FindContainers {
                owner_id: owner_id.to_string(),
            },
        )
        .await;
        if self.failures.read().await.find.contains(owner_id) {
            return Err(unavailable("find containers"));
        }
        Ok(self.containers_for(owner_id).await)
    }

    async fn create_container(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
        name: &str,
    ) -> ConnectorResult<Container> {
        self.record(
            credential,
            ResourceCall::CreateContainer {
                owner_id: owner_id.to_string(),
                name: name.to_string(),
            },
        )
        .await;
        if self.failures.read().await.create.contains(owner_id) {
            return Err(unavailable("create container"));
        }

        let container = Container {
            id: format!("ws-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        };
        self.add_container(container.clone()).await;
        Ok(container)
    }

    async fn list_owned_resources(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<OwnedResourceList> {
        self.record(
            credential,
            ResourceCall::ListOwnedResources {
                owner_id: owner_id.to_string(),
            },
        )
        .await;
        {
            let failures = self.failures.read().await;
            if failures.list.contains(owner_id) {
                return Err(unavailable("list resources"));
            }
            if failures.malformed.contains(owner_id) {
                return Ok(OwnedResourceList::malformed(
                    "response has no data.response.projects array",
                ));
            }
        }
        Ok(OwnedResourceList::new(
            self.resources
                .read()
                .await
                .get(owner_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn update_resource_owner(
        &self,
        credential: &BearerCredential,
        resource_id: &str,
        new_owner_id: &str,
    ) -> ConnectorResult<()> {
        self.record(
            credential,
            ResourceCall::UpdateResourceOwner {
                resource_id: resource_id.to_string(),
                new_owner_id: new_owner_id.to_string(),
            },
        )
        .await;
        if self.failures.read().await.update.contains(resource_id) {
            return Err(ConnectorError::Timeout(format!(
                "Update of {} timed out",
                resource_id
            )));
        }
        self.assignments
            .write()
            .await
            .insert(resource_id.to_string(), new_owner_id.to_string());

        let mut resources = self.resources.write().await;
        let moved = resources.values_mut().find_map(|listed| {
            listed
                .iter()
                .position(|r| r.id == resource_id)
                .map(|pos| listed.remove(pos))
        });
        if let Some(mut resource) = moved {
            resource.owner_id = new_owner_id.to_string();
            resources
                .entry(new_owner_id.to_string())
                .or_default()
                .push(resource);
        }
        Ok(())
    }

    async fn list_sub_resources(
        &self,
        credential: &BearerCredential,
        kind: SubResourceKind,
        resource_id: &str,
    ) -> ConnectorResult<Vec<SubResource>> {
        self.record(
            credential,
            ResourceCall::ListSubResources {
                kind,
                resource_id: resource_id.to_string(),
            },
        )
        .await;
        let key = (kind, resource_id.to_string());
        if self.failures.read().await.sub_resources.contains(&key) {
            return Err(unavailable("list sub-resources"));
        }
        Ok(self
            .sub_resources
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_resource;

    fn credential() -> BearerCredential {
        BearerCredential::new("token-u-1")
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let client = MockResourceClient::new("mock");
        assert!(client
            .find_containers(&credential(), "u-1")
            .await
            .unwrap()
            .is_empty());

        let created = client
            .create_container(&credential(), "u-1", "Ann")
            .await
            .unwrap();
        let found = client.find_containers(&credential(), "u-1").await.unwrap();
        assert_eq!(found, vec![created]);
        assert_eq!(client.mutating_call_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_moves_resource_to_new_owner() {
        let client = MockResourceClient::new("mock");
        client.add_resource(sample_resource("p-1", "u-1")).await;
        client.add_resource(sample_resource("p-2", "u-1")).await;

        client
            .update_resource_owner(&credential(), "p-1", "ws-1")
            .await
            .unwrap();
        assert_eq!(client.resource_owner("p-1").await.as_deref(), Some("ws-1"));

        let remaining = client
            .list_owned_resources(&credential(), "u-1")
            .await
            .unwrap();
        assert_eq!(remaining.resources.len(), 1);
        assert_eq!(remaining.resources[0].id, "p-2");

        let moved = client
            .list_owned_resources(&credential(), "ws-1")
            .await
            .unwrap();
        assert_eq!(moved.resources.len(), 1);
        assert_eq!(moved.resources[0].owner_id, "ws-1");

        let calls = client.update_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].token, "token-u-1");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let client = MockResourceClient::new("mock");
        client.fail_update("p-2").await;
        client.malformed_list_resources("u-2").await;
        client
            .fail_sub_resources(SubResourceKind::Branch, "p-2")
            .await;

        assert!(matches!(
            client.update_resource_owner(&credential(), "p-2", "ws-1").await,
            Err(ConnectorError::Timeout(_))
        ));
        assert!(client
            .list_owned_resources(&credential(), "u-2")
            .await
            .unwrap()
            .malformed
            .is_some());
        assert!(client
            .list_sub_resources(&credential(), SubResourceKind::Branch, "p-2")
            .await
            .is_err());
        assert!(client
            .list_sub_resources(&credential(), SubResourceKind::Version, "p-2")
            .await
            .unwrap()
            .is_empty());
    }
}

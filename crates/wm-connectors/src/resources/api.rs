//! HTTP connector for the workspace/project API.
//!
//! Every endpoint is a `POST` that answers with the envelope
//! `{ "data": { "response": <payload> } }`. Owner ids travel in the `userId`
//! body field; per-project calls also name the project in a header.

use crate::http::{HttpClient, RateLimitConfig, RequestOptions};
use crate::traits::{
    BearerCredential, Connector, ConnectorConfig, ConnectorError, ConnectorHealth,
    ConnectorResult, Container, OwnedResource, OwnedResourceList, ResourceClient, SubResource,
    SubResourceKind,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Resource API configuration.
#[derive(Debug, Clone)]
pub struct ResourceApiConfig {
    /// Connection settings; `timeout_secs` is the default per-call timeout.
    pub connector: ConnectorConfig,
    /// Timeout for owner updates, the highest fan-out call.
    pub update_timeout: Duration,
    /// Header that names the project on per-project calls.
    pub resource_header: String,
    /// Optional client-side rate limit.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Resource API connector.
pub struct ResourceApiConnector {
    config: ResourceApiConfig,
    client: HttpClient,
}

impl ResourceApiConnector {
    pub fn new(config: ResourceApiConfig) -> ConnectorResult<Self> {
        let client = HttpClient::with_rate_limit(config.connector.clone(), config.rate_limit.clone())?;
        info!("Resource API connector initialized for '{}'", client.base_url());
        Ok(Self { config, client })
    }

    fn options(&self, credential: &BearerCredential) -> RequestOptions {
        RequestOptions::new().bearer(credential.token())
    }

    fn resource_options(&self, credential: &BearerCredential, resource_id: &str) -> RequestOptions {
        self.options(credential)
            .header(self.config.resource_header.as_str(), resource_id)
    }

    async fn call(&self, path: &str, body: &Value, options: &RequestOptions) -> ConnectorResult<Value> {
        self.client.post_json(path, body, options).await
    }

    /// The payload inside the response envelope.
    fn payload(body: &Value) -> Option<&Value> {
        body.pointer("/data/response")
    }

    fn parse_container(value: &Value, owner_id: &str) -> Option<Container> {
        let id = value
            .get("_id")
            .or_else(|| value.get("id"))
            .and_then(id_string)?;
        Some(Container {
            id,
            owner_id: value
                .get("userId")
                .and_then(Value::as_str)
                .unwrap_or(owner_id)
                .to_string(),
            name: value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn parse_resource(value: &Value, owner_id: &str) -> Option<OwnedResource> {
        let id = value.get("projectId").and_then(id_string)?;
        Some(OwnedResource {
            id,
            owner_id: value
                .get("userId")
                .and_then(Value::as_str)
                .unwrap_or(owner_id)
                .to_string(),
            metadata: value.clone(),
        })
    }

    fn parse_sub_resource(kind: SubResourceKind, resource_id: &str, value: &Value) -> Option<SubResource> {
        let id = match kind {
            SubResourceKind::Branch => value
                .get("branchId")
                .or_else(|| value.get("id"))
                .and_then(id_string),
            SubResourceKind::Version => match value.get("version") {
                Some(v) => id_string(v),
                None => id_string(value),
            },
        }?;
        Some(SubResource {
            kind,
            resource_id: resource_id.to_string(),
            id,
        })
    }
}

/// Normalises a string or number id to a string.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Connector for ResourceApiConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "resources"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        // Without an identity credential the API can only prove it is reachable.
        match self.client.get("", &RequestOptions::new()).await {
            Ok(_)
            | Err(ConnectorError::NotFound(_))
            | Err(ConnectorError::AuthenticationFailed(_))
            | Err(ConnectorError::AuthorizationDenied(_)) => Ok(ConnectorHealth::Healthy),
            Err(ConnectorError::ConnectionFailed(e)) | Err(ConnectorError::Timeout(e)) => {
                Ok(ConnectorHealth::Unhealthy(format!("Connection failed: {}", e)))
            }
            Err(e) => Ok(ConnectorHealth::Degraded(e.to_string())),
        }
    }
}

#[async_trait]
impl ResourceClient for ResourceApiConnector {
    #[instrument(skip(self, credential))]
    async fn find_containers(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<Vec<Container>> {
        let body = json!({ "userId": owner_id });
        let response = match self
            .call("/workspace/getAllForOwner", &body, &self.options(credential))
            .await
        {
            Ok(response) => response,
            Err(ConnectorError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let Some(items) = Self::payload(&response).and_then(Value::as_array) else {
            debug!("No container list in response");
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| {
                let parsed = Self::parse_container(item, owner_id);
                if parsed.is_none() {
                    warn!("Skipping container without id");
                }
                parsed
            })
            .collect())
    }

    #[instrument(skip(self, credential))]
    async fn create_container(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
        name: &str,
    ) -> ConnectorResult<Container> {
        let body = json!({ "userId": owner_id, "name": name });
        let response = self
            .call("/workspace/create", &body, &self.options(credential))
            .await?;

        Self::payload(&response)
            .and_then(|payload| Self::parse_container(payload, owner_id))
            .ok_or_else(|| {
                ConnectorError::InvalidResponse("Create response has no container id".into())
            })
    }

    #[instrument(skip(self, credential))]
    async fn list_owned_resources(
        &self,
        credential: &BearerCredential,
        owner_id: &str,
    ) -> ConnectorResult<OwnedResourceList> {
        let body = json!({ "userId": owner_id });
        let response = self
            .call(
                "/project/getAllUserOwnedProjects",
                &body,
                &self.options(credential),
            )
            .await?;

        let Some(items) = Self::payload(&response)
            .and_then(|payload| payload.get("projects"))
            .and_then(Value::as_array)
        else {
            warn!("Owned project list missing from response");
            return Ok(OwnedResourceList::malformed(
                "response has no data.response.projects array",
            ));
        };

        Ok(OwnedResourceList::new(
            items
                .iter()
                .filter_map(|item| Self::parse_resource(item, owner_id))
                .collect(),
        ))
    }

    #[instrument(skip(self, credential))]
    async fn update_resource_owner(
        &self,
        credential: &BearerCredential,
        resource_id: &str,
        new_owner_id: &str,
    ) -> ConnectorResult<()> {
        let body = json!({ "update": { "userId": new_owner_id } });
        let options = self
            .resource_options(credential, resource_id)
            .timeout(self.config.update_timeout);
        self.client.post("/project/update", &body, &options).await?;
        Ok(())
    }

    #[instrument(skip(self, credential))]
    async fn list_sub_resources(
        &self,
        credential: &BearerCredential,
        kind: SubResourceKind,
        resource_id: &str,
    ) -> ConnectorResult<Vec<SubResource>> {
        let path = match kind {
            SubResourceKind::Branch => "/branches/getByProjectId",
            SubResourceKind::Version => "/version/getAll",
        };
        let body = json!({ "projectId": resource_id });
        let response = self
            .call(path, &body, &self.resource_options(credential, resource_id))
            .await?;

        let Some(items) = Self::payload(&response).and_then(Value::as_array) else {
            debug!(%kind, "No sub-resource list in response");
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| {
                let parsed = Self::parse_sub_resource(kind, resource_id, item);
                if parsed.is_none() {
                    warn!(%kind, "Skipping sub-resource without id");
                }
                parsed
            })
            .collect())
    }
}

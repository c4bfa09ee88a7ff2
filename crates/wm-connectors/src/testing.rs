//! Testing harness for connector implementations and the orchestrator.
//!
//! Provides fixtures shared by unit tests in this crate and by the
//! integration tests of the crates built on top of it.

use crate::traits::{
    ConnectorConfig, ConnectorHealth, ConnectorResult, Identity, OwnedResource,
};
use std::collections::HashMap;

/// Creates a test connector config with sensible defaults.
pub fn test_connector_config(name: &str, base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        timeout_secs: 30,
        max_retries: 0,
        verify_tls: true,
        headers: HashMap::new(),
    }
}

/// Creates an identity with a display name and email derived from its id.
pub fn sample_identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: Some(format!("User {}", id)),
        email: Some(format!("{}@example.com", id)),
    }
}

/// Creates `count` identities named `user-0000`, `user-0001`, ...
pub fn sample_identities(count: usize) -> Vec<Identity> {
    (0..count)
        .map(|i| sample_identity(&format!("user-{:04}", i)))
        .collect()
}

/// Creates a resource owned by `owner_id`.
pub fn sample_resource(id: &str, owner_id: &str) -> OwnedResource {
    OwnedResource {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        metadata: serde_json::json!({ "name": format!("Project {}", id) }),
    }
}

/// Asserts that a connector health check returns healthy.
pub fn assert_healthy(result: &ConnectorResult<ConnectorHealth>) {
    match result {
        Ok(ConnectorHealth::Healthy) => {}
        other => panic!("Expected Healthy, got {:?}", other),
    }
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
#[cfg(test)]
pub(crate) async fn spawn_fake_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

/// RSA key pair used to sign and verify assertions in tests.
#[cfg(test)]
pub(crate) const TEST_PRIVATE_KEY: &str = include_str!("../testdata/test_key.pem");

#[cfg(test)]
pub(crate) const TEST_PUBLIC_KEY: &str = include_str!("../testdata/test_key.pub.pem");

/// Service-account JSON wrapping [`TEST_PRIVATE_KEY`].
#[cfg(test)]
pub(crate) fn test_service_account_json(token_uri: &str) -> String {
    serde_json::json!({
        "type": "service_account",
        "project_id": "demo-project",
        "private_key_id": "key-1",
        "private_key": TEST_PRIVATE_KEY,
        "client_email": "migrator@demo-project.iam.gserviceaccount.com",
        "token_uri": token_uri,
    })
    .to_string()
}

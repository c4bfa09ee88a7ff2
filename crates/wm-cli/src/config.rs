//! Configuration loading for the workspace migrator CLI.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wm_connectors::auth::DEFAULT_EXCHANGE_URL;
use wm_connectors::identity::DEFAULT_IDENTITY_BASE_URL;
use wm_connectors::ServiceAccountKey;
use wm_core::{KeyLayout, OrchestratorConfig, DEFAULT_CONTAINER_NAME, DEFAULT_PAGE_SIZE};

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Credential minting and exchange.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Remote resource API.
    #[serde(default)]
    pub api: ApiConfig,

    /// Object storage holding the artifacts.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Run behaviour.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Fills values left empty in the file from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Fills values left empty in the file from `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |field: &mut String, name: &str| {
            if field.is_empty() {
                if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                    *field = value;
                }
            }
        };

        if self.auth.service_account_path.is_empty() {
            fill(&mut self.auth.service_account_json, "CREDENTIALS");
        }
        fill(&mut self.auth.api_key, "FIREBASE_API_KEY");
        fill(&mut self.storage.bucket, "AWS_S3_BUCKET");
        fill(&mut self.storage.region, "AWS_REGION");
        fill(&mut self.storage.legacy_root, "BLOB_ROOT");
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();

        if !config.auth.api_key.is_empty() {
            config.auth.api_key = REDACTED.to_string();
        }
        if !config.auth.service_account_json.is_empty() {
            config.auth.service_account_json = REDACTED.to_string();
        }

        config
    }

    /// Reads the service-account key, inline JSON first.
    pub fn service_account_key(&self) -> Result<ServiceAccountKey> {
        let mut key = if !self.auth.service_account_json.is_empty() {
            ServiceAccountKey::from_json(&self.auth.service_account_json)
                .context("Failed to parse inline service account key")?
        } else if !self.auth.service_account_path.is_empty() {
            let path = Path::new(&self.auth.service_account_path);
            ServiceAccountKey::from_file(path).with_context(|| {
                format!("Failed to load service account key: {}", path.display())
            })?
        } else {
            bail!("No service account key configured (auth.service_account_path or CREDENTIALS)");
        };

        if let Some(token_url) = self.auth.token_url.as_ref().filter(|u| !u.is_empty()) {
            key.token_uri = token_url.clone();
        }
        Ok(key)
    }

    /// Project whose identities are listed; the key's project unless set.
    pub fn project_id(&self, key: &ServiceAccountKey) -> String {
        if self.auth.project_id.is_empty() {
            key.project_id.clone()
        } else {
            self.auth.project_id.clone()
        }
    }

    /// Builds the orchestrator configuration, with `limit` overriding the file.
    pub fn orchestrator_config(&self, limit: Option<usize>) -> OrchestratorConfig {
        let migration = &self.migration;
        OrchestratorConfig {
            identity_limit: limit.or(migration.identity_limit),
            page_size: migration.page_size,
            pacing: Duration::from_millis(migration.pacing_ms),
            relocation_concurrency: migration.relocation_concurrency.max(1),
            default_container_name: migration.default_container_name.clone(),
            key_layout: KeyLayout::new(
                self.storage.legacy_root.as_str(),
                self.storage.new_root(),
            ),
        }
    }
}

/// Auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity project; defaults to the service account's project.
    #[serde(default)]
    pub project_id: String,

    /// Web API key for the token exchange.
    #[serde(default)]
    pub api_key: String,

    /// Path to the service-account JSON key.
    #[serde(default)]
    pub service_account_path: String,

    /// Inline service-account JSON key.
    #[serde(default)]
    pub service_account_json: String,

    /// Overrides the key's OAuth2 token endpoint.
    #[serde(default)]
    pub token_url: Option<String>,

    #[serde(default = "default_exchange_url")]
    pub exchange_url: String,

    #[serde(default = "default_identity_base_url")]
    pub identity_base_url: String,

    /// How long an exchanged credential is reused.
    #[serde(default = "default_token_cache_ttl")]
    pub token_cache_ttl_secs: u64,
}

fn default_exchange_url() -> String {
    DEFAULT_EXCHANGE_URL.to_string()
}

fn default_identity_base_url() -> String {
    DEFAULT_IDENTITY_BASE_URL.to_string()
}

fn default_token_cache_ttl() -> u64 {
    50 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            service_account_path: String::new(),
            service_account_json: String::new(),
            token_url: None,
            exchange_url: default_exchange_url(),
            identity_base_url: default_identity_base_url(),
            token_cache_ttl_secs: default_token_cache_ttl(),
        }
    }
}

/// Resource API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the API.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for owner updates in seconds.
    #[serde(default = "default_update_timeout")]
    pub update_timeout_secs: u64,

    /// Client-side retries for transport failures.
    #[serde(default)]
    pub max_retries: u32,

    /// Header naming the project on per-project calls.
    #[serde(default = "default_resource_header")]
    pub resource_header: String,

    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api/v1".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_update_timeout() -> u64 {
    30
}

fn default_resource_header() -> String {
    "projectid".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_timeout(),
            update_timeout_secs: default_update_timeout(),
            max_retries: 0,
            resource_header: default_resource_header(),
            rate_limit_per_minute: None,
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub region: String,

    /// Custom S3 endpoint (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Root prefix of the legacy layout.
    #[serde(default)]
    pub legacy_root: String,

    /// Root prefix of the canonical layout; defaults to `legacy_root`.
    #[serde(default)]
    pub new_root: Option<String>,
}

impl StorageConfig {
    pub fn new_root(&self) -> &str {
        self.new_root.as_deref().unwrap_or(&self.legacy_root)
    }
}

/// Migration run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Process only the first `n` identities.
    #[serde(default)]
    pub identity_limit: Option<usize>,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Delay between owner updates in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    #[serde(default = "default_relocation_concurrency")]
    pub relocation_concurrency: usize,

    #[serde(default = "default_container_name")]
    pub default_container_name: String,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_pacing_ms() -> u64 {
    200
}

fn default_relocation_concurrency() -> usize {
    1
}

fn default_container_name() -> String {
    DEFAULT_CONTAINER_NAME.to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            identity_limit: None,
            page_size: default_page_size(),
            pacing_ms: default_pacing_ms(),
            relocation_concurrency: default_relocation_concurrency(),
            default_container_name: default_container_name(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format.
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

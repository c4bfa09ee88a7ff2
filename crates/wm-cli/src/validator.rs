//! Configuration validation for the workspace migrator.
//!
//! Runs before any command that touches a boundary so that a misconfigured
//! run stops before the first identity is enumerated.

use crate::config::AppConfig;
use colored::Colorize;
use std::path::Path;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent a run.
    pub errors: Vec<String>,
    /// Warnings that should be reviewed but don't prevent a run.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before a run.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the application configuration.
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_credentials(config, &mut result);
        Self::validate_api(config, &mut result);
        Self::validate_storage(config, &mut result);
        Self::validate_migration(config, &mut result);

        result
    }

    fn validate_credentials(config: &AppConfig, result: &mut ValidationResult) {
        let auth = &config.auth;

        if auth.service_account_json.is_empty() && auth.service_account_path.is_empty() {
            result.add_error(
                "Missing required config: service account key. \
                 Set auth.service_account_path or the CREDENTIALS environment variable.",
            );
        } else if auth.service_account_json.is_empty() {
            let path = Path::new(&auth.service_account_path);
            if !path.exists() {
                result.add_error(format!(
                    "Service account key file not found: {}",
                    auth.service_account_path
                ));
            }
        } else if let Err(e) = serde_json::from_str::<serde_json::Value>(&auth.service_account_json)
        {
            result.add_error(format!("Inline service account key is not valid JSON: {}", e));
        }

        if auth.api_key.is_empty() {
            result.add_error(
                "Missing required config: auth.api_key. \
                 Set it in the config file or the FIREBASE_API_KEY environment variable.",
            );
        }

        for (field, url) in [
            ("auth.exchange_url", &auth.exchange_url),
            ("auth.identity_base_url", &auth.identity_base_url),
        ] {
            if let Err(e) = reqwest::Url::parse(url) {
                result.add_error(format!("Invalid {} '{}': {}", field, url, e));
            }
        }
    }

    fn validate_api(config: &AppConfig, result: &mut ValidationResult) {
        let api = &config.api;

        match reqwest::Url::parse(&api.base_url) {
            Ok(url) if url.scheme() == "http" && !is_local(url.host_str()) => {
                result.add_warning(format!(
                    "api.base_url '{}' uses plain HTTP; credentials will be sent unencrypted.",
                    api.base_url
                ));
            }
            Ok(_) => {}
            Err(e) => {
                result.add_error(format!("Invalid api.base_url '{}': {}", api.base_url, e));
            }
        }

        if api.timeout_secs == 0 || api.update_timeout_secs == 0 {
            result.add_error("api.timeout_secs and api.update_timeout_secs must be positive");
        }

        if api.resource_header.trim().is_empty() {
            result.add_error("api.resource_header must not be empty");
        }

        if api.rate_limit_per_minute == Some(0) {
            result.add_error("api.rate_limit_per_minute must be positive when set");
        }
    }

    fn validate_storage(config: &AppConfig, result: &mut ValidationResult) {
        let storage = &config.storage;

        if storage.bucket.is_empty() {
            result.add_error(
                "Missing required config: storage.bucket. \
                 Set it in the config file or the AWS_S3_BUCKET environment variable.",
            );
        }

        if storage.region.is_empty() {
            result.add_warning("storage.region not set; the S3 client default will be used.");
        }

        if storage.legacy_root.is_empty() {
            result.add_warning(
                "storage.legacy_root is empty; artifact keys will start at the bucket root.",
            );
        }
    }

    fn validate_migration(config: &AppConfig, result: &mut ValidationResult) {
        let migration = &config.migration;

        if migration.page_size == 0 {
            result.add_error("migration.page_size must be positive");
        } else if migration.page_size > 1000 {
            result.add_warning(format!(
                "migration.page_size {} exceeds the provider maximum; 1000 will be used.",
                migration.page_size
            ));
        }

        if migration.pacing_ms == 0 {
            result.add_warning(
                "migration.pacing_ms is 0; owner updates will be sent back to back.",
            );
        }

        if migration.relocation_concurrency > 1 {
            result.add_warning(format!(
                "migration.relocation_concurrency is {}; artifacts of a resource will be \
                 relocated in parallel.",
                migration.relocation_concurrency
            ));
        }

        if migration.identity_limit.is_none() {
            result.add_warning(
                "migration.identity_limit not set; every enumerated identity will be processed.",
            );
        }

        if migration.default_container_name.trim().is_empty() {
            result.add_error("migration.default_container_name must not be empty");
        }
    }
}

fn is_local(host: Option<&str>) -> bool {
    matches!(host, Some("localhost") | Some("127.0.0.1") | Some("::1") | Some("[::1]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A configuration that passes every error check.
    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.service_account_json = r#"{"project_id":"demo"}"#.to_string();
        config.auth.api_key = "web-key".to_string();
        config.storage.bucket = "artifacts".to_string();
        config.storage.region = "eu-west-1".to_string();
        config.storage.legacy_root = "public".to_string();
        config.migration.identity_limit = Some(10);
        config
    }

    #[test]
    fn test_validation_result_operations() {
        let mut result = ValidationResult::new();
        assert!(!result.has_errors());
        assert!(!result.has_warnings());

        result.add_error("broken");
        result.add_warning("odd");
        assert!(result.has_errors());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_valid_config() {
        let result = ConfigValidator::validate(&valid_config());
        assert!(!result.has_errors(), "{:?}", result.errors);
        assert!(!result.has_warnings(), "{:?}", result.warnings);
    }

    #[test]
    fn test_missing_bucket() {
        let mut config = valid_config();
        config.storage.bucket.clear();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("storage.bucket")));
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = valid_config();
        config.auth.service_account_json.clear();
        config.auth.api_key.clear();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("service account key")));
        assert!(result.errors.iter().any(|e| e.contains("auth.api_key")));
    }

    #[test]
    fn test_missing_key_file() {
        let mut config = valid_config();
        config.auth.service_account_json.clear();
        config.auth.service_account_path = "/nonexistent/key.json".to_string();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("not found")));
    }

    #[test]
    fn test_existing_key_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = valid_config();
        config.auth.service_account_json.clear();
        config.auth.service_account_path = file.path().display().to_string();
        let result = ConfigValidator::validate(&config);
        assert!(!result.has_errors(), "{:?}", result.errors);
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = valid_config();
        config.api.base_url = "not a url".to_string();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("api.base_url")));
    }

    #[test]
    fn test_remote_plain_http_warning() {
        let mut config = valid_config();
        config.api.base_url = "http://api.example.com/v1".to_string();
        let result = ConfigValidator::validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("plain HTTP")));
    }

    #[test]
    fn test_zero_page_size() {
        let mut config = valid_config();
        config.migration.page_size = 0;
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("page_size")));
    }

    #[test]
    fn test_run_shape_warnings() {
        let mut config = valid_config();
        config.migration.pacing_ms = 0;
        config.migration.relocation_concurrency = 4;
        config.migration.identity_limit = None;
        let result = ConfigValidator::validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 3);
    }
}

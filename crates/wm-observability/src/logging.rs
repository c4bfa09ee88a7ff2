//! Logging infrastructure for the workspace migrator.
//!
//! This module provides structured logging using the tracing ecosystem.
//! Logs go to stderr so a JSON run summary on stdout stays machine readable.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Crates whose events pass the default filter.
const CRATES: [&str; 3] = ["wm_core", "wm_connectors", "wm_cli"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include span events.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose output with span close events and source locations.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_target: true,
        }
    }

    /// JSON output for log aggregation.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_target: true,
        }
    }

    fn default_filter(&self) -> String {
        CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parses a level name such as `info` or `DEBUG`.
pub fn parse_level(name: &str) -> Option<Level> {
    name.trim().parse().ok()
}

/// Initializes the logging system with default configuration.
pub fn init_logging() -> Result<(), TryInitError> {
    init_logging_with_config(LoggingConfig::default())
}

/// Initializes the logging system with the given configuration.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let span_events = if config.include_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    }
}

/// Creates a span for processing one identity.
#[macro_export]
macro_rules! identity_span {
    ($identity_id:expr) => {
        tracing::info_span!("identity", identity_id = %$identity_id)
    };
    ($identity_id:expr, $($field:tt)*) => {
        tracing::info_span!("identity", identity_id = %$identity_id, $($field)*)
    };
}

/// Creates a span for sweeping one resource.
#[macro_export]
macro_rules! resource_span {
    ($resource_id:expr, $identity_id:expr) => {
        tracing::info_span!("resource", resource_id = %$resource_id, identity_id = %$identity_id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert!(config.json_format);
        assert!(!config.include_spans);
    }

    #[test]
    fn test_default_filter_covers_all_crates() {
        let config = LoggingConfig::development();
        assert_eq!(
            config.default_filter(),
            "wm_core=DEBUG,wm_connectors=DEBUG,wm_cli=DEBUG"
        );
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level(" DEBUG "), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_span_macros() {
        let identity = crate::identity_span!("u-1", resources = 2);
        let _entered = identity.enter();
        let resource = crate::resource_span!("p-1", "u-1");
        resource.in_scope(|| tracing::debug!("inside resource span"));
    }
}

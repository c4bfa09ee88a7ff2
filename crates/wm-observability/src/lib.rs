//! # wm-observability
//!
//! Logging infrastructure for the workspace migrator.
//!
//! This crate provides structured logging with tracing, in text or JSON,
//! and span helpers for the units of work a migration run walks through.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, parse_level, LoggingConfig};

//! CLI command implementations.

pub mod check;
pub mod connectors;
pub mod migrate;

pub use check::{print_health, probe};
pub use connectors::Boundaries;
pub use migrate::{run_dry_run, run_migration, MigrateArgs, EXIT_FATAL};

//! Migrate, relocate and dry-run commands.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn};
use wm_core::{DryRunReport, IdentityStatus, MigrationError, RunOptions, RunReport, RunSummary};

use super::connectors::Boundaries;
use crate::config::AppConfig;
use crate::OutputFormat;

/// Exit status when identities could not be enumerated.
pub const EXIT_FATAL: i32 = 1;

/// Exit status of a run stopped by Ctrl-C.
pub const EXIT_CANCELLED: i32 = 130;

/// Arguments shared by the sweep commands.
#[derive(Debug, Clone, Default)]
pub struct MigrateArgs {
    pub options: RunOptions,
    /// Overrides `migration.identity_limit`.
    pub limit: Option<usize>,
    /// Where to write the full JSON report.
    pub report_path: Option<PathBuf>,
}

/// Turns the first Ctrl-C into a shutdown signal.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            eprintln!(
                "\n{}",
                "Interrupted. Finishing in-flight calls and writing the report...".yellow()
            );
            let _ = tx.send(true);
        }
    });
    rx
}

/// Runs the selected sweeps and returns the process exit status.
pub async fn run_migration(config: &AppConfig, args: MigrateArgs, format: OutputFormat) -> Result<i32> {
    let boundaries = Boundaries::from_config(config)?;
    let orchestrator = boundaries.orchestrator(
        config.orchestrator_config(args.limit),
        shutdown_on_ctrl_c(),
    );

    info!(
        ownership = args.options.ownership,
        relocation = args.options.relocation,
        explicit = args.options.identities.len(),
        "Starting migration run"
    );

    let report = match orchestrator.run(args.options).await {
        Ok(report) => report,
        Err(e) => return Ok(report_fatal(&e)),
    };

    if let Some(path) = &args.report_path {
        write_report(path, &report)?;
        info!(path = %path.display(), "Report written");
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.summary)?),
        OutputFormat::Text => print_run_report(&report),
    }

    Ok(if report.cancelled { EXIT_CANCELLED } else { 0 })
}

/// Reports what a migration would do.
pub async fn run_dry_run(config: &AppConfig, limit: Option<usize>, format: OutputFormat) -> Result<i32> {
    let boundaries = Boundaries::from_config(config)?;
    let orchestrator =
        boundaries.orchestrator(config.orchestrator_config(limit), shutdown_on_ctrl_c());

    let report = match orchestrator.dry_run().await {
        Ok(report) => report,
        Err(e) => return Ok(report_fatal(&e)),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_dry_run(&report),
    }

    Ok(if report.cancelled { EXIT_CANCELLED } else { 0 })
}

fn report_fatal(e: &MigrationError) -> i32 {
    error!(error = %e, "Migration run aborted");
    eprintln!("{}: {}", "Migration aborted".red().bold(), e);
    EXIT_FATAL
}

/// Writes the full report as pretty JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let contents = serde_json::to_string_pretty(report)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

fn print_run_report(report: &RunReport) {
    let s = &report.summary;

    println!();
    println!("{}", "Migration Summary".bold());
    println!("─────────────────");
    println!("Run: {}", report.run_id);
    println!(
        "Identities: {} enumerated, {} selected",
        report.identities_total, report.identities_selected
    );
    println!(
        "  {} processed  {} failed  {} skipped",
        s.identities_processed.to_string().green(),
        colour_failures(s.identities_failed),
        s.identities_skipped
    );
    println!(
        "Containers: {} created, {} reused",
        s.containers_created, s.containers_reused
    );
    println!(
        "Resources:  {} updated, {} failed",
        s.resources_updated.to_string().green(),
        colour_failures(s.resources_failed)
    );
    println!(
        "Artifacts:  {} migrated, {} already present, {} missing, {} failed",
        s.relocations_migrated.to_string().green(),
        s.relocations_skipped_exists,
        s.relocations_skipped_missing,
        colour_failures(s.relocations_failed)
    );
    if s.sub_resource_failures > 0 || s.warnings > 0 {
        println!(
            "Listing failures: {}  Warnings: {}",
            colour_failures(s.sub_resource_failures),
            s.warnings.to_string().yellow()
        );
    }

    print_failed_identities(report);

    if report.cancelled {
        println!();
        println!("{}", "Run was cancelled; unprocessed identities were skipped.".yellow().bold());
    } else if is_clean(s) {
        println!();
        println!("{}", "Migration completed.".green().bold());
    } else {
        println!();
        println!(
            "{}",
            "Migration completed with failures. Re-run to retry; finished work is skipped."
                .yellow()
                .bold()
        );
    }
}

fn print_failed_identities(report: &RunReport) {
    let failed: Vec<_> = report
        .identities
        .iter()
        .filter(|i| i.status == IdentityStatus::Failed)
        .collect();
    if failed.is_empty() {
        return;
    }

    println!();
    println!("{}", "Failed identities:".red().bold());
    for identity in failed {
        let reason = identity
            .error
            .as_ref()
            .or_else(|| identity.ownership.as_ref().and_then(|o| o.error.as_ref()))
            .or_else(|| identity.relocation.as_ref().and_then(|r| r.error.as_ref()))
            .map(|e| e.to_string())
            .unwrap_or_else(|| "see report".to_string());
        println!("  {} {}: {}", "✗".red(), identity.identity_id, reason);
    }
}

fn print_dry_run(report: &DryRunReport) {
    println!();
    println!("{}", "Dry Run".bold());
    println!("───────");
    println!(
        "Identities: {} enumerated, {} selected",
        report.identities_total, report.identities_selected
    );

    for identity in &report.identities {
        if let Some(e) = &identity.error {
            println!("  {} {}: {}", "✗".red(), identity.identity_id, e);
            continue;
        }
        let container = match &identity.would_create {
            Some(name) => format!("would create '{}'", name).yellow(),
            None => format!("reuses 1 of {}", identity.existing_containers).normal(),
        };
        println!(
            "  {} {}: {} resources, container {}",
            "→".green(),
            identity.identity_id,
            identity.owned_resources,
            container
        );
        for warning in &identity.warnings {
            println!("      {} {}", "⚠".yellow(), warning);
        }
    }

    let creates = report
        .identities
        .iter()
        .filter(|i| i.would_create.is_some())
        .count();
    let resources: usize = report.identities.iter().map(|i| i.owned_resources).sum();
    println!();
    println!(
        "{} containers to create, {} resources to re-parent",
        creates.to_string().bold(),
        resources.to_string().bold()
    );
    if report.cancelled {
        println!("{}", "Dry run was cancelled.".yellow().bold());
    }
}

fn colour_failures(count: usize) -> colored::ColoredString {
    if count == 0 {
        count.to_string().normal()
    } else {
        count.to_string().red()
    }
}

fn is_clean(summary: &RunSummary) -> bool {
    summary.identities_failed == 0
        && summary.resources_failed == 0
        && summary.relocations_failed == 0
        && summary.sub_resource_failures == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_core::IdentityOutcome;

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = RunReport::new(3, 2);
        report.identities.push(IdentityOutcome::skipped("u-1"));
        report.finish();
        write_report(&path, &report).unwrap();

        let written: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.run_id, report.run_id);
        assert_eq!(written.identities_total, 3);
        assert_eq!(written.summary.identities_skipped, 1);
    }

    #[test]
    fn test_write_report_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        assert!(write_report(&path, &RunReport::new(0, 0)).is_err());
    }

    #[test]
    fn test_is_clean() {
        let mut summary = RunSummary::default();
        assert!(is_clean(&summary));
        summary.relocations_failed = 1;
        assert!(!is_clean(&summary));
    }

    #[test]
    fn test_fatal_exit_status() {
        let status = report_fatal(&MigrationError::Enumeration("page 2 failed".into()));
        assert_eq!(status, EXIT_FATAL);
    }
}

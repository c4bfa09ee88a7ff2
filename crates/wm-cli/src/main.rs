//! Workspace Migrator CLI
//!
//! Command-line runner that re-parents every identity's projects under a
//! personal workspace and relocates their artifacts to the canonical layout.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;
mod validator;

use commands::{print_health, probe, run_dry_run, run_migration, Boundaries, MigrateArgs, EXIT_FATAL};
use config::AppConfig;
use validator::ConfigValidator;
use wm_core::RunOptions;

#[derive(Parser)]
#[command(name = "workspace-migrator")]
#[command(author = "Workspace Migrator Team")]
#[command(version)]
#[command(about = "Idempotent migration of projects into personal workspaces", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ownership sweep, then the relocation sweep
    Migrate {
        /// Only re-parent projects
        #[arg(long)]
        skip_relocation: bool,

        /// Only relocate artifacts
        #[arg(long)]
        skip_ownership: bool,

        /// Process only the first N identities
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write the full run report as JSON
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show what a migration would change without changing anything
    DryRun {
        /// Process only the first N identities
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Relocate artifacts only
    Relocate {
        /// Identity to relocate (repeatable); defaults to all selected identities
        #[arg(short, long = "identity", value_name = "ID")]
        identities: Vec<String>,

        /// Process only the first N identities
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write the full run report as JSON
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Probe the identity provider, token exchange, resource API and object store
    Check,

    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => return Err(e),
        Err(_) => {
            if cli.verbose {
                eprintln!("Using default configuration (no config file found)");
            }
            AppConfig::default()
        }
    };
    config.apply_env();

    // Initialize logging
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        wm_observability::parse_level(&config.logging.level).unwrap_or(tracing::Level::INFO)
    };

    if let Err(e) = wm_observability::init_logging_with_config(wm_observability::LoggingConfig {
        level: log_level,
        json_format: cli.format == OutputFormat::Json || config.logging.json_format,
        ..Default::default()
    }) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    // Execute command
    let status = match cli.command {
        Commands::Migrate {
            skip_relocation,
            skip_ownership,
            limit,
            report,
        } => {
            if skip_relocation && skip_ownership {
                bail!("--skip-relocation and --skip-ownership leave nothing to run");
            }
            let options = RunOptions {
                ownership: !skip_ownership,
                relocation: !skip_relocation,
                identities: Vec::new(),
            };
            cmd_run(
                &config,
                MigrateArgs {
                    options,
                    limit,
                    report_path: report,
                },
                cli.format,
            )
            .await?
        }
        Commands::DryRun { limit } => {
            preflight(&config, cli.format)?;
            run_dry_run(&config, limit, cli.format).await?
        }
        Commands::Relocate {
            identities,
            limit,
            report,
        } => {
            cmd_run(
                &config,
                MigrateArgs {
                    options: RunOptions::relocation_only(identities),
                    limit,
                    report_path: report,
                },
                cli.format,
            )
            .await?
        }
        Commands::Check => cmd_check(&config, cli.format).await?,
        Commands::Validate { config: cfg_path } => cmd_validate(cfg_path.unwrap_or(config_path))?,
        Commands::Config { show_secrets } => cmd_config(&config, show_secrets, cli.format)?,
    };

    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) =
        directories::ProjectDirs::from("com", "workspace-migrator", "workspace-migrator")
    {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/default.yaml")
    }
}

/// Refuses to touch any boundary with an invalid configuration.
fn preflight(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let validation_result = ConfigValidator::validate(config);

    if validation_result.has_errors() {
        validation_result.print();
        println!();
        println!(
            "{}",
            "Run aborted due to configuration errors. Fix the errors above and try again."
                .red()
                .bold()
        );
        std::process::exit(EXIT_FATAL);
    }

    if format == OutputFormat::Text && validation_result.has_warnings() {
        validation_result.print();
    }
    Ok(())
}

async fn cmd_run(config: &AppConfig, args: MigrateArgs, format: OutputFormat) -> Result<i32> {
    preflight(config, format)?;
    run_migration(config, args, format).await
}

async fn cmd_check(config: &AppConfig, format: OutputFormat) -> Result<i32> {
    let boundaries = Boundaries::from_config(config)?;
    let lines = probe(&boundaries.connectors()).await;
    print_health(&lines, format)
}

fn cmd_validate(config_path: PathBuf) -> Result<i32> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    // First, check if the file can be loaded
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{}: {:#}", "Configuration file error".red().bold(), e);
            return Ok(EXIT_FATAL);
        }
    };
    config.apply_env();

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    // Summary
    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Resource API: {}", config.api.base_url);
    println!(
        "  Bucket: {} ({})",
        config.storage.bucket, config.storage.region
    );
    println!(
        "  Roots: {} -> {}",
        config.storage.legacy_root,
        config.storage.new_root()
    );
    println!(
        "  Identity limit: {}",
        config
            .migration
            .identity_limit
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Pacing: {}ms", config.migration.pacing_ms);

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        Ok(EXIT_FATAL)
    } else if validation_result.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
        Ok(0)
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
        Ok(0)
    }
}

fn cmd_config(config: &AppConfig, show_secrets: bool, format: OutputFormat) -> Result<i32> {
    let display_config = if show_secrets {
        config.clone()
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        print!("{}", serde_yaml::to_string(&display_config)?);
    }

    Ok(0)
}

//! Check command - probes every boundary.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use wm_connectors::{Connector, ConnectorHealth};

use crate::OutputFormat;

/// Health of one boundary.
#[derive(Debug, Serialize)]
pub struct HealthLine {
    pub name: String,
    pub connector_type: String,
    pub health: ConnectorHealth,
}

/// Runs each connector's health check; an error counts as unhealthy.
pub async fn probe(connectors: &[Arc<dyn Connector>]) -> Vec<HealthLine> {
    let mut lines = Vec::with_capacity(connectors.len());
    for connector in connectors {
        let health = match connector.health_check().await {
            Ok(health) => health,
            Err(e) => ConnectorHealth::Unhealthy(e.to_string()),
        };
        lines.push(HealthLine {
            name: connector.name().to_string(),
            connector_type: connector.connector_type().to_string(),
            health,
        });
    }
    lines
}

/// Prints the probe results and returns the process exit status.
pub fn print_health(lines: &[HealthLine], format: OutputFormat) -> Result<i32> {
    let unhealthy = lines
        .iter()
        .filter(|l| matches!(l.health, ConnectorHealth::Unhealthy(_)))
        .count();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(lines)?);
    } else {
        println!("{}", "Boundary Health".bold());
        println!("───────────────");
        for line in lines {
            let label = format!("{} ({})", line.name, line.connector_type);
            match &line.health {
                ConnectorHealth::Healthy => println!("  {} {}", "✓".green(), label),
                ConnectorHealth::Degraded(reason) => {
                    println!("  {} {}: {}", "⚠".yellow(), label, reason)
                }
                ConnectorHealth::Unhealthy(reason) => {
                    println!("  {} {}: {}", "✗".red(), label, reason)
                }
            }
        }
    }

    Ok(if unhealthy > 0 { 1 } else { 0 })
}

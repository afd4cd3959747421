//! `swend heal` and `swend check-health`.

use std::time::Duration;

use anyhow::Context;
use colored::*;
use swen_daemon::{Runtime, StateView, SwenConfig};
use swen_health::CycleReport;
use swen_types::HealthStatus;

use crate::commands::run::shutdown_signal;
use crate::output::{
    colorize_health, print_json, print_output, print_success, print_warning, OutputFormat,
    SubsystemRow,
};

/// Run one remediation pass, or keep running until interrupted.
pub async fn heal(
    config: SwenConfig,
    monitor: bool,
    interval: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let runtime = Runtime::open(config, None)
        .await
        .context("failed to load persisted state")?;

    if !monitor {
        let report = runtime.health.run_once().await;
        print_cycle(&report, format)?;
        print_output(&runtime.health.status(), |s| SubsystemRow::from(s), format)?;
        return Ok(());
    }

    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| runtime.config.health.interval());
    println!(
        "Monitoring {} subsystems every {}s (Ctrl+C to stop)",
        runtime.health.status().len(),
        interval.as_secs()
    );

    let health = runtime.health.clone();
    let handle = tokio::spawn(async move { health.run_continuous(interval).await });
    shutdown_signal().await;
    runtime.health.stop().await;
    handle.await.context("health loop task failed")?;
    Ok(())
}

/// Probe every subsystem without remediating. Fails when any is degraded.
/// Reads state without taking ownership, so it works next to a running
/// daemon.
pub async fn check(config: SwenConfig, format: OutputFormat) -> anyhow::Result<()> {
    let view = StateView::open(config)
        .await
        .context("failed to read persisted state")?;
    let summary = view.health()?.check_health().await;

    if let OutputFormat::Json = format {
        print_json(&summary)?;
    } else {
        println!("Overall: {}", colorize_health(summary.overall));
        for (name, result) in &summary.subsystems {
            let mark = if result.is_healthy() {
                "✓".green()
            } else {
                "✗".red()
            };
            print!("  {} {} ({}ms)", mark, name, result.latency_ms);
            if let Some(message) = &result.message {
                print!(" - {}", message.dimmed());
            }
            println!();
        }
    }

    if summary.overall == HealthStatus::Degraded {
        anyhow::bail!("one or more subsystems are degraded");
    }
    Ok(())
}

fn print_cycle(report: &CycleReport, format: OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        print_json(report)?;
        return Ok(());
    }

    if report.skipped {
        print_warning(&format!(
            "Cycle skipped: {}",
            report.skip_reason.as_deref().unwrap_or("unknown")
        ));
        return Ok(());
    }

    for subsystem in &report.subsystems {
        let remediation = subsystem
            .remediation
            .map(|o| format!(", remediation {} after {} attempts", o, subsystem.attempts))
            .unwrap_or_default();
        println!(
            "  {} {}{}",
            subsystem.name,
            colorize_health(subsystem.status),
            remediation
        );
    }
    if report.all_healthy() {
        print_success("All subsystems healthy");
    }
    Ok(())
}

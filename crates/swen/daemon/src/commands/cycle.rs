//! `swend cycle` and `swend status`.

use anyhow::Context;
use colored::*;
use serde::Serialize;
use swen_daemon::{Runtime, StateView, SwenConfig};
use swen_health::SubsystemStatus;
use swen_pool::StatusReport;
use swen_types::HealthEvent;

use crate::output::{
    colorize_pool_status, print_info, print_json, print_output, print_success, print_warning,
    AlertRow, OutputFormat, TicketRow,
};

/// Run a single decision cycle and print what it did.
pub async fn run_once(config: SwenConfig, format: OutputFormat) -> anyhow::Result<()> {
    let runtime = Runtime::open(config, None)
        .await
        .context("failed to load persisted state")?;
    let summary = runtime
        .cycle
        .run_cycle()
        .await
        .context("decision cycle failed")?;

    if let OutputFormat::Json = format {
        print_json(&summary)?;
        return Ok(());
    }

    if let Some(id) = &summary.snapshot_id {
        println!("Snapshot: {}", id);
    }
    println!(
        "Evaluated: {}  Replayed: {}",
        summary.evaluated, summary.replayed
    );
    for opened in &summary.opened {
        print_success(&format!(
            "{}: ticket {} ({}, {})",
            opened.service, opened.ticket_id, opened.verdict, opened.state
        ));
    }
    for blocked in &summary.blocked {
        print_warning(&format!("{}: blocked: {}", blocked.service, blocked.reason));
    }
    for dropped in &summary.dropped {
        print_info(&format!("{}: dropped: {}", dropped.service, dropped.reason));
    }
    println!(
        "Policy: {} evaluated, {} auto-approved, {} manual review, {} blocked",
        summary.policy.evaluated,
        summary.policy.auto_approved,
        summary.policy.manual_review,
        summary.policy.blocked
    );
    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    pool: StatusReport,
    subsystems: Vec<SubsystemStatus>,
    recent_health_events: Vec<HealthEvent>,
    pending_requests: usize,
}

/// Pool report plus the latest health events. Safe to run next to a
/// running daemon: nothing is written.
pub async fn status(config: SwenConfig, format: OutputFormat) -> anyhow::Result<()> {
    let view = StateView::open(config)
        .await
        .context("failed to read persisted state")?;
    let report = view.pool.status_report();
    let recent = view.recent_health(10).await?;
    let pending = view.pending_requests().await?.len();

    if let OutputFormat::Json = format {
        print_json(&StatusView {
            pool: report,
            subsystems: view.health()?.status(),
            recent_health_events: recent,
            pending_requests: pending,
        })?;
        return Ok(());
    }

    println!("SWEN Ticket Pool");
    println!("----------------");
    println!(
        "Tickets: {}/{}  Status: {}  Accepting new: {}",
        report.total_tickets,
        report.max_tickets,
        colorize_pool_status(report.status),
        if report.can_create_new {
            "yes".green()
        } else {
            "no".red()
        }
    );
    println!();
    print_output(&report.tickets, |t| TicketRow::from(t), format)?;

    if !report.alerts.is_empty() {
        println!("\n{}", "Stale tickets".bold());
        print_output(&report.alerts, |a| AlertRow::from(a), format)?;
    }

    for recommendation in &report.recommendations {
        print_warning(recommendation);
    }
    if pending > 0 {
        print_info(&format!("{} operator requests waiting for swend", pending));
    }

    if !recent.is_empty() {
        println!("\n{}", "Recent health events".bold());
        for event in &recent {
            let outcome = event
                .outcome
                .map(|o| format!(" [{}]", o))
                .unwrap_or_default();
            println!(
                "  {} {} {}{} {}",
                event.detected_at.format("%Y-%m-%d %H:%M:%S"),
                event.subsystem,
                event.status,
                outcome,
                event.detail.as_deref().unwrap_or("").dimmed()
            );
        }
    }

    Ok(())
}

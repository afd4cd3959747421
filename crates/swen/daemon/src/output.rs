//! Output formatting utilities

use chrono::Utc;
use colored::*;
use serde::Serialize;
use swen_health::{SubsystemState, SubsystemStatus};
use swen_pool::{AlertSeverity, PoolStatus, StaleAlert};
use swen_types::{ChangeTicket, HealthStatus, TicketState};
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or the raw items as JSON.
pub fn print_output<T: Serialize, R: Tabled>(
    data: &[T],
    to_row: impl Fn(&T) -> R,
    format: OutputFormat,
) -> serde_json::Result<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data.iter().map(to_row)));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

/// Print a single item as JSON.
pub fn print_json<T: Serialize>(data: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

#[derive(Tabled)]
pub struct TicketRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Move")]
    pub change: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Verdict")]
    pub verdict: String,
    #[tabled(rename = "Savings/mo")]
    pub savings: String,
    #[tabled(rename = "Age")]
    pub age: String,
}

impl From<&ChangeTicket> for TicketRow {
    fn from(ticket: &ChangeTicket) -> Self {
        let age = ticket.age(Utc::now());
        Self {
            id: ticket.id.to_string(),
            service: ticket.service.clone(),
            change: format!("{} → {}", ticket.from_provider, ticket.to_provider),
            state: colorize_ticket_state(ticket.state),
            verdict: ticket.verdict.outcome.to_string(),
            savings: format!("${:.2}", ticket.predicted_monthly_savings),
            age: format!("{}h{:02}m", age.num_hours(), age.num_minutes() % 60),
        }
    }
}

#[derive(Tabled)]
pub struct AlertRow {
    #[tabled(rename = "Ticket")]
    pub ticket: String,
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Age (h)")]
    pub age_hours: String,
    #[tabled(rename = "Severity")]
    pub severity: String,
}

impl From<&StaleAlert> for AlertRow {
    fn from(alert: &StaleAlert) -> Self {
        let severity = match alert.severity {
            AlertSeverity::High => "high".red().bold().to_string(),
            AlertSeverity::Medium => "medium".yellow().to_string(),
        };
        Self {
            ticket: alert.ticket_id.to_string(),
            service: alert.service.clone(),
            age_hours: format!("{:.1}", alert.age_hours),
            severity,
        }
    }
}

#[derive(Tabled)]
pub struct SubsystemRow {
    #[tabled(rename = "Subsystem")]
    pub name: String,
    #[tabled(rename = "Probe")]
    pub probe: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Failures")]
    pub failures: u32,
    #[tabled(rename = "Last Remediation")]
    pub last_remediation: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<&SubsystemStatus> for SubsystemRow {
    fn from(status: &SubsystemStatus) -> Self {
        Self {
            name: status.name.clone(),
            probe: status.probe.clone(),
            state: colorize_subsystem_state(status.state),
            failures: status.consecutive_failures,
            last_remediation: status
                .last_remediation
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
            message: status.last_message.clone().unwrap_or_default(),
        }
    }
}

pub fn colorize_pool_status(status: PoolStatus) -> String {
    match status {
        PoolStatus::Healthy => status.to_string().green().to_string(),
        PoolStatus::AtCapacity => status.to_string().yellow().to_string(),
        PoolStatus::Stale | PoolStatus::OverLimit => status.to_string().red().to_string(),
    }
}

pub fn colorize_health(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => status.to_string().green().to_string(),
        HealthStatus::Degraded => status.to_string().red().to_string(),
    }
}

fn colorize_ticket_state(state: TicketState) -> String {
    match state {
        TicketState::Pending => state.to_string().normal().to_string(),
        TicketState::ManualReview => state.to_string().yellow().to_string(),
        TicketState::Approved | TicketState::Applying => state.to_string().cyan().to_string(),
        TicketState::Applied => state.to_string().green().to_string(),
        TicketState::Failed | TicketState::Rejected | TicketState::Expired => {
            state.to_string().red().to_string()
        }
    }
}

fn colorize_subsystem_state(state: SubsystemState) -> String {
    match state {
        SubsystemState::Healthy => state.to_string().green().to_string(),
        SubsystemState::Degraded => state.to_string().red().to_string(),
        SubsystemState::Remediating => state.to_string().yellow().to_string(),
    }
}

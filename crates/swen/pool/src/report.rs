//! Pool status reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swen_types::{ChangeTicket, TicketId};

/// Severity of a stale-ticket alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
        }
    }
}

/// An open ticket older than the stale threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleAlert {
    pub ticket_id: TicketId,
    pub service: String,
    pub age_hours: f64,
    pub severity: AlertSeverity,
    pub message: String,
}

impl StaleAlert {
    /// Build an alert; severity is high past twice the threshold.
    pub fn for_ticket(
        ticket: &ChangeTicket,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Self {
        let age = ticket.age(now);
        let age_hours = age.num_seconds() as f64 / 3600.0;
        let severity = if age > threshold * 2 {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        };
        Self {
            ticket_id: ticket.id.clone(),
            service: ticket.service.clone(),
            age_hours,
            severity,
            message: format!(
                "Ticket {} for {} is {:.1} hours old and needs attention",
                ticket.id, ticket.service, age_hours
            ),
        }
    }
}

/// Overall pool condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Healthy,
    AtCapacity,
    Stale,
    OverLimit,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolStatus::Healthy => write!(f, "healthy"),
            PoolStatus::AtCapacity => write!(f, "at_capacity"),
            PoolStatus::Stale => write!(f, "stale"),
            PoolStatus::OverLimit => write!(f, "over_limit"),
        }
    }
}

/// Snapshot report of the pool for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub total_tickets: usize,
    pub max_tickets: usize,
    pub status: PoolStatus,
    pub alerts: Vec<StaleAlert>,
    pub tickets: Vec<ChangeTicket>,
    pub can_create_new: bool,
    pub recommendations: Vec<String>,
}

impl StatusReport {
    pub fn build(
        tickets: Vec<ChangeTicket>,
        max_tickets: usize,
        alerts: Vec<StaleAlert>,
        now: DateTime<Utc>,
    ) -> Self {
        let total = tickets.len();
        let status = if total > max_tickets {
            PoolStatus::OverLimit
        } else if !alerts.is_empty() {
            PoolStatus::Stale
        } else if total == max_tickets {
            PoolStatus::AtCapacity
        } else {
            PoolStatus::Healthy
        };

        let mut recommendations = Vec::new();
        if total > max_tickets {
            recommendations.push("Immediate cleanup required".to_string());
        }
        if !alerts.is_empty() {
            recommendations.push(format!("Resolve {} unresolved tickets", alerts.len()));
        }
        if total == 0 {
            recommendations.push("No open tickets; check that the decision cycle is running".to_string());
        }

        Self {
            timestamp: now,
            total_tickets: total,
            max_tickets,
            status,
            can_create_new: total < max_tickets && alerts.is_empty(),
            alerts,
            tickets,
            recommendations,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, PoolStatus::Healthy | PoolStatus::AtCapacity)
    }
}

//! Health event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Probe result for one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Outcome of a remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    Failure,
    /// Not attempted (cycle skipped, nothing configured).
    Skipped,
}

impl std::fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationOutcome::Success => write!(f, "success"),
            RemediationOutcome::Failure => write!(f, "failure"),
            RemediationOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Append-only health log entry. Never mutated after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthEvent {
    pub subsystem: String,
    pub status: HealthStatus,
    pub detected_at: DateTime<Utc>,

    #[serde(default)]
    pub remediation_action: Option<String>,

    #[serde(default)]
    pub outcome: Option<RemediationOutcome>,

    /// Human-readable detail (probe message, failure cause).
    #[serde(default)]
    pub detail: Option<String>,
}

impl HealthEvent {
    /// Record a probe observation.
    pub fn probe(
        subsystem: impl Into<String>,
        status: HealthStatus,
        detail: Option<String>,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            status,
            detected_at: Utc::now(),
            remediation_action: None,
            outcome: None,
            detail,
        }
    }

    /// Record a remediation outcome.
    pub fn remediation(
        subsystem: impl Into<String>,
        status: HealthStatus,
        action: impl Into<String>,
        outcome: RemediationOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            status,
            detected_at: Utc::now(),
            remediation_action: Some(action.into()),
            outcome: Some(outcome),
            detail: Some(detail.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Some(RemediationOutcome::Failure)
    }
}

//! Scores, decisions and verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DecisionId, SnapshotId};

/// Normalized score for one provider. Every component is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: String,
    pub cost_score: f64,
    pub latency_score: f64,
    pub credit_score: f64,
    pub availability_score: f64,
    pub total: f64,
}

/// A scored recommendation to move a service to a different provider.
///
/// Decisions are append-only and keyed by `(service, snapshot_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub service: String,
    pub snapshot_id: SnapshotId,
    pub current_provider: String,
    pub recommended_provider: String,

    /// Trust in the recommendation, in [0, 1].
    pub confidence: f64,

    /// Projected savings in dollars per month.
    pub predicted_monthly_savings: f64,

    /// Human-readable rationale.
    pub explanation: String,

    pub created_at: DateTime<Utc>,

    /// Hourly cost on the current provider, when observed.
    #[serde(default)]
    pub current_hourly_cost: Option<f64>,

    /// Hourly cost on the recommended provider, when observed.
    #[serde(default)]
    pub recommended_hourly_cost: Option<f64>,

    /// Scores of every candidate, best first.
    #[serde(default)]
    pub scores: Vec<ProviderScore>,
}

impl Decision {
    /// Key used to deduplicate decisions for the same observation.
    pub fn key(&self) -> (String, SnapshotId) {
        (self.service.clone(), self.snapshot_id.clone())
    }

    /// Relative hourly cost change, `|recommended - current| / current`.
    ///
    /// Zero when the current cost is unknown or zero.
    pub fn cost_delta(&self) -> f64 {
        match (self.current_hourly_cost, self.recommended_hourly_cost) {
            (Some(current), Some(recommended)) if current > 0.0 => {
                (recommended - current).abs() / current
            }
            _ => 0.0,
        }
    }

    /// Score of the recommended provider, if it was recorded.
    pub fn recommended_score(&self) -> Option<&ProviderScore> {
        self.scores
            .iter()
            .find(|s| s.provider == self.recommended_provider)
    }
}

/// Admission-control outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    AutoApprove,
    ManualReview,
    Block,
}

impl std::fmt::Display for VerdictOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictOutcome::AutoApprove => write!(f, "auto_approve"),
            VerdictOutcome::ManualReview => write!(f, "manual_review"),
            VerdictOutcome::Block => write!(f, "block"),
        }
    }
}

/// Policy verdict for a decision. Derived, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision_id: DecisionId,
    pub outcome: VerdictOutcome,
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn new(decision_id: DecisionId, outcome: VerdictOutcome, reasons: Vec<String>) -> Self {
        Self {
            decision_id,
            outcome,
            reasons,
        }
    }

    pub fn is_auto_approved(&self) -> bool {
        self.outcome == VerdictOutcome::AutoApprove
    }

    pub fn needs_review(&self) -> bool {
        self.outcome == VerdictOutcome::ManualReview
    }

    pub fn is_blocked(&self) -> bool {
        self.outcome == VerdictOutcome::Block
    }

    /// Reasons joined for log lines.
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }
}

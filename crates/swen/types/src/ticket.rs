//! Change ticket lifecycle.
//!
//! ```text
//! Pending ──► Approved ──► Applying ──► Applied | Failed
//!    │            ▲
//!    ├──► ManualReview ──► Rejected
//!    │            │
//!    └────────────┴──► Expired
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::{Decision, Verdict};
use crate::ids::{DecisionId, SnapshotId, TicketId};

/// State of a change ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Created, awaiting routing.
    Pending,
    /// Waiting for an operator.
    ManualReview,
    /// Cleared for application.
    Approved,
    /// Handed to the change executor.
    Applying,
    /// Change applied.
    Applied,
    /// Change failed to apply.
    Failed,
    /// Rejected by an operator.
    Rejected,
    /// Evicted by age or capacity enforcement.
    Expired,
}

impl TicketState {
    /// Whether the ticket has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketState::Applied | TicketState::Failed | TicketState::Rejected | TicketState::Expired
        )
    }

    /// Open tickets count against the pool bound.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the ticket may still be age- or capacity-evicted.
    pub fn is_evictable(&self) -> bool {
        matches!(self, TicketState::Pending | TicketState::ManualReview)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(&self, to: TicketState) -> bool {
        use TicketState::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, ManualReview)
                | (Pending, Expired)
                | (ManualReview, Approved)
                | (ManualReview, Rejected)
                | (ManualReview, Expired)
                | (Approved, Applying)
                | (Applying, Applied)
                | (Applying, Failed)
        )
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TicketState::Pending => "pending",
            TicketState::ManualReview => "manual_review",
            TicketState::Approved => "approved",
            TicketState::Applying => "applying",
            TicketState::Applied => "applied",
            TicketState::Failed => "failed",
            TicketState::Rejected => "rejected",
            TicketState::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ticket transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TicketState,
    pub to: TicketState,
}

/// One proposed infrastructure change awaiting approval or application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeTicket {
    pub id: TicketId,
    pub decision_id: DecisionId,
    pub service: String,
    pub from_provider: String,
    pub to_provider: String,
    pub created_at: DateTime<Utc>,

    /// Snapshot the decision was made from.
    #[serde(default)]
    pub snapshot_id: Option<SnapshotId>,

    /// Insertion sequence, breaks `created_at` ties.
    #[serde(default)]
    pub seq: u64,

    pub state: TicketState,
    pub verdict: Verdict,

    #[serde(default)]
    pub predicted_monthly_savings: f64,

    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Note attached by the last transition (rejection reason, failure cause).
    #[serde(default)]
    pub note: Option<String>,
}

impl ChangeTicket {
    /// Build a pending ticket from an accepted decision and its verdict.
    pub fn from_decision(decision: &Decision, verdict: Verdict) -> Self {
        Self {
            id: TicketId::generate(),
            decision_id: decision.id.clone(),
            service: decision.service.clone(),
            from_provider: decision.current_provider.clone(),
            to_provider: decision.recommended_provider.clone(),
            created_at: Utc::now(),
            snapshot_id: Some(decision.snapshot_id.clone()),
            seq: 0,
            state: TicketState::Pending,
            verdict,
            predicted_monthly_savings: decision.predicted_monthly_savings,
            applied_at: None,
            updated_at: None,
            note: None,
        }
    }

    /// Move to `to`, enforcing the lifecycle.
    pub fn transition(&mut self, to: TicketState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        self.state = to;
        self.updated_at = Some(now);
        if to == TicketState::Applied {
            self.applied_at = Some(now);
        }
        Ok(())
    }

    /// Transition and attach a note.
    pub fn transition_with_note(
        &mut self,
        to: TicketState,
        note: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition(to)?;
        self.note = Some(note.into());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// `(service, snapshot)` this ticket was decided from, when known.
    pub fn decision_key(&self) -> Option<(String, SnapshotId)> {
        self.snapshot_id
            .as_ref()
            .map(|id| (self.service.clone(), id.clone()))
    }

    /// Eviction order: oldest first, then insertion order.
    pub fn eviction_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::VerdictOutcome;

    fn ticket() -> ChangeTicket {
        ChangeTicket {
            id: TicketId::generate(),
            decision_id: DecisionId::generate(),
            service: "api".into(),
            from_provider: "aws".into(),
            to_provider: "alibaba".into(),
            created_at: Utc::now(),
            snapshot_id: None,
            seq: 1,
            state: TicketState::Pending,
            verdict: Verdict::new(DecisionId::generate(), VerdictOutcome::AutoApprove, vec![]),
            predicted_monthly_savings: 100.0,
            applied_at: None,
            updated_at: None,
            note: None,
        }
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut t = ticket();
        t.transition(TicketState::Approved).unwrap();
        t.transition(TicketState::Applying).unwrap();
        t.transition(TicketState::Applied).unwrap();
        assert!(t.state.is_terminal());
        assert!(t.applied_at.is_some());
    }

    #[test]
    fn test_review_path() {
        let mut t = ticket();
        t.transition(TicketState::ManualReview).unwrap();
        t.transition_with_note(TicketState::Rejected, "not this quarter")
            .unwrap();
        assert_eq!(t.note.as_deref(), Some("not this quarter"));
        assert!(!t.is_open());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut t = ticket();
        let err = t.transition(TicketState::Applied).unwrap_err();
        assert_eq!(err.from, TicketState::Pending);
        assert_eq!(t.state, TicketState::Pending);

        t.transition(TicketState::Approved).unwrap();
        assert!(t.transition(TicketState::Expired).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            TicketState::Applied,
            TicketState::Failed,
            TicketState::Rejected,
            TicketState::Expired,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.is_evictable());
            for to in [TicketState::Pending, TicketState::Approved, TicketState::Expired] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }
}

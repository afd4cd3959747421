//! Verdict counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use swen_types::{Verdict, VerdictOutcome};

/// Running totals of verdicts.
#[derive(Debug, Default)]
pub struct PolicyStats {
    evaluated: AtomicU64,
    auto_approved: AtomicU64,
    manual_review: AtomicU64,
    blocked: AtomicU64,
}

/// Point-in-time copy of [`PolicyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatsSnapshot {
    pub evaluated: u64,
    pub auto_approved: u64,
    pub manual_review: u64,
    pub blocked: u64,
}

impl PolicyStats {
    pub fn record(&self, verdict: &Verdict) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        let counter = match verdict.outcome {
            VerdictOutcome::AutoApprove => &self.auto_approved,
            VerdictOutcome::ManualReview => &self.manual_review,
            VerdictOutcome::Block => &self.blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PolicyStatsSnapshot {
        PolicyStatsSnapshot {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            auto_approved: self.auto_approved.load(Ordering::Relaxed),
            manual_review: self.manual_review.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
        }
    }
}

impl PolicyStatsSnapshot {
    /// Share of evaluated decisions that were auto-approved.
    pub fn auto_approval_rate(&self) -> f64 {
        if self.evaluated == 0 {
            0.0
        } else {
            self.auto_approved as f64 / self.evaluated as f64
        }
    }
}

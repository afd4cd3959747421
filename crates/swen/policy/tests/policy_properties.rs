//! Property tests: evaluation is deterministic and always yields a verdict
//! with reasons.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use swen_policy::{PolicyGate, TicketMetadata};
use swen_types::{Decision, DecisionId, SnapshotId, VerdictOutcome};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn arb_fraction() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -0.5f64..1.5,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

fn arb_decision() -> impl Strategy<Value = Decision> {
    (arb_fraction(), -100.0f64..2000.0).prop_map(|(confidence, savings)| Decision {
        id: DecisionId::generate(),
        service: "api".into(),
        snapshot_id: SnapshotId::new("snap"),
        current_provider: "aws".into(),
        recommended_provider: "gcp".into(),
        confidence,
        predicted_monthly_savings: savings,
        explanation: String::new(),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        current_hourly_cost: None,
        recommended_hourly_cost: None,
        scores: Vec::new(),
    })
}

fn arb_metadata() -> impl Strategy<Value = TicketMetadata> {
    (any::<bool>(), arb_fraction(), arb_fraction())
        .prop_map(|(stateful, delta, traffic)| TicketMetadata::new("api", stateful, delta, traffic))
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Evaluating twice gives identical verdicts.
    #[test]
    fn evaluation_is_deterministic(decision in arb_decision(), metadata in arb_metadata()) {
        let gate = PolicyGate::default();
        let first = gate.evaluate(&decision, &metadata);
        let second = gate.evaluate(&decision, &metadata);
        prop_assert_eq!(first, second);
    }

    /// Every verdict carries at least one reason.
    #[test]
    fn verdict_always_explained(decision in arb_decision(), metadata in arb_metadata()) {
        let verdict = PolicyGate::default().evaluate(&decision, &metadata);
        prop_assert!(!verdict.reasons.is_empty());
        prop_assert_eq!(verdict.decision_id, decision.id);
    }

    /// Auto-approval implies every auto threshold holds.
    #[test]
    fn auto_approval_respects_thresholds(decision in arb_decision(), metadata in arb_metadata()) {
        let verdict = PolicyGate::default().evaluate(&decision, &metadata);
        if verdict.outcome == VerdictOutcome::AutoApprove {
            prop_assert!(!metadata.stateful);
            prop_assert!(metadata.cost_delta <= 0.05);
            prop_assert!(decision.confidence >= 0.85);
            prop_assert!(metadata.traffic_impact <= 0.10);
            prop_assert!(decision.predicted_monthly_savings >= 50.0);
        }
    }
}

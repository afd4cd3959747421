//! Admission gate.
//!
//! `PolicyGate::evaluate` is a pure function of the decision, the ticket
//! metadata and the configured rules. It never fails: malformed input is
//! blocked with an explanation.

use swen_types::{Decision, Verdict, VerdictOutcome};
use tracing::debug;

use crate::error::PolicyResult;
use crate::metadata::TicketMetadata;
use crate::rules::{Facts, PolicyRuleSet, PolicyThresholds};
use crate::stats::PolicyStats;

/// Evaluates decisions against an ordered rule set.
#[derive(Debug)]
pub struct PolicyGate {
    rules: PolicyRuleSet,
    stats: PolicyStats,
}

impl PolicyGate {
    /// Create a gate over a validated rule set.
    pub fn new(rules: PolicyRuleSet) -> PolicyResult<Self> {
        let rules = PolicyRuleSet::new(rules.rules)?;
        Ok(Self {
            rules,
            stats: PolicyStats::default(),
        })
    }

    /// Create a gate with the standard rules for the given thresholds.
    pub fn from_thresholds(thresholds: &PolicyThresholds) -> PolicyResult<Self> {
        thresholds.validate()?;
        Self::new(PolicyRuleSet::from_thresholds(thresholds))
    }

    pub fn rules(&self) -> &PolicyRuleSet {
        &self.rules
    }

    /// Counters of verdicts produced through [`PolicyGate::admit`].
    pub fn stats(&self) -> &PolicyStats {
        &self.stats
    }

    /// Evaluate a decision. Same inputs always give the same verdict.
    pub fn evaluate(&self, decision: &Decision, metadata: &TicketMetadata) -> Verdict {
        if let Some(problem) = validate_input(decision, metadata) {
            return Verdict::new(
                decision.id.clone(),
                VerdictOutcome::Block,
                vec![format!("invalid input: {}", problem)],
            );
        }

        let facts = Facts { decision, metadata };
        for rule in &self.rules.rules {
            if rule.matches(&facts) {
                debug!(
                    decision_id = %decision.id,
                    service = %decision.service,
                    rule = %rule.id,
                    outcome = %rule.outcome,
                    "Policy rule matched"
                );
                return Verdict::new(decision.id.clone(), rule.outcome, rule.reasons(&facts));
            }
        }

        Verdict::new(
            decision.id.clone(),
            VerdictOutcome::ManualReview,
            vec!["no policy rule matched".to_string()],
        )
    }

    /// Evaluate and count the verdict.
    pub fn admit(&self, decision: &Decision, metadata: &TicketMetadata) -> Verdict {
        let verdict = self.evaluate(decision, metadata);
        self.stats.record(&verdict);
        verdict
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self {
            rules: PolicyRuleSet::default(),
            stats: PolicyStats::default(),
        }
    }
}

fn validate_input(decision: &Decision, metadata: &TicketMetadata) -> Option<String> {
    if decision.service.trim().is_empty() {
        return Some("decision has no service".to_string());
    }
    if decision.service != metadata.service {
        return Some(format!(
            "metadata for {} does not match decision for {}",
            metadata.service, decision.service
        ));
    }
    if !decision.confidence.is_finite() || !(0.0..=1.0).contains(&decision.confidence) {
        return Some(format!("confidence {} outside [0, 1]", decision.confidence));
    }
    if !decision.predicted_monthly_savings.is_finite() {
        return Some("predicted savings is not a number".to_string());
    }
    if !metadata.cost_delta.is_finite() || metadata.cost_delta < 0.0 {
        return Some(format!("cost delta {} is not a non-negative number", metadata.cost_delta));
    }
    if !metadata.traffic_impact.is_finite() || !(0.0..=1.0).contains(&metadata.traffic_impact) {
        return Some(format!("traffic impact {} outside [0, 1]", metadata.traffic_impact));
    }
    if let Some(minutes) = metadata.downtime_minutes {
        if !minutes.is_finite() || minutes < 0.0 {
            return Some(format!("downtime {} is not a non-negative number", minutes));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RiskLevel;
    use crate::rules::{Condition, PolicyRule};
    use chrono::Utc;
    use swen_types::{DecisionId, SnapshotId};

    fn decision(confidence: f64, savings: f64) -> Decision {
        Decision {
            id: DecisionId::generate(),
            service: "api".into(),
            snapshot_id: SnapshotId::new("snap"),
            current_provider: "aws".into(),
            recommended_provider: "alibaba".into(),
            confidence,
            predicted_monthly_savings: savings,
            explanation: String::new(),
            created_at: Utc::now(),
            current_hourly_cost: None,
            recommended_hourly_cost: None,
            scores: Vec::new(),
        }
    }

    fn meta(cost_delta: f64, traffic: f64) -> TicketMetadata {
        TicketMetadata::new("api", false, cost_delta, traffic)
    }

    #[test]
    fn test_small_confident_change_is_auto_approved() {
        let gate = PolicyGate::default();
        let v = gate.evaluate(&decision(0.90, 100.0), &meta(0.03, 0.05));
        assert_eq!(v.outcome, VerdictOutcome::AutoApprove);
        assert!(v.reasons[0].starts_with("auto-approve"));
    }

    #[test]
    fn test_moderate_cost_delta_needs_review() {
        let gate = PolicyGate::default();
        let v = gate.evaluate(&decision(0.90, 100.0), &meta(0.12, 0.05));
        assert_eq!(v.outcome, VerdictOutcome::ManualReview);
    }

    #[test]
    fn test_low_confidence_is_blocked() {
        let gate = PolicyGate::default();
        let v = gate.evaluate(&decision(0.60, 100.0), &meta(0.03, 0.05));
        assert_eq!(v.outcome, VerdictOutcome::Block);
        assert!(v.reason().contains("confidence 60% below 70%"));
    }

    #[test]
    fn test_large_cost_delta_is_blocked() {
        let gate = PolicyGate::default();
        let v = gate.evaluate(&decision(0.95, 500.0), &meta(0.35, 0.05));
        assert!(v.is_blocked());
    }

    #[test]
    fn test_stateful_service_always_reviewed() {
        let gate = PolicyGate::default();
        let m = TicketMetadata::new("api", true, 0.01, 0.01);
        let v = gate.evaluate(&decision(0.99, 1000.0), &m);
        assert!(v.needs_review());
        // Stateful outranks block.
        let v = gate.evaluate(&decision(0.10, 1000.0), &m);
        assert!(v.needs_review());
    }

    #[test]
    fn test_risk_and_downtime_limit_auto_approval() {
        let gate = PolicyGate::default();
        let risky = meta(0.03, 0.05).with_risk(RiskLevel::High);
        assert!(gate.evaluate(&decision(0.90, 100.0), &risky).needs_review());

        let slow = meta(0.03, 0.05).with_downtime(30.0);
        assert!(gate.evaluate(&decision(0.90, 100.0), &slow).needs_review());

        let fine = meta(0.03, 0.05).with_risk(RiskLevel::Low).with_downtime(1.0);
        assert!(gate.evaluate(&decision(0.90, 100.0), &fine).is_auto_approved());
    }

    #[test]
    fn test_savings_below_floor_needs_review() {
        let gate = PolicyGate::default();
        let v = gate.evaluate(&decision(0.90, 10.0), &meta(0.03, 0.05));
        assert!(v.needs_review());
    }

    #[test]
    fn test_invalid_input_is_blocked() {
        let gate = PolicyGate::default();

        let v = gate.evaluate(&decision(f64::NAN, 100.0), &meta(0.03, 0.05));
        assert!(v.is_blocked());
        assert!(v.reason().starts_with("invalid input"));

        let v = gate.evaluate(&decision(0.9, 100.0), &meta(-0.1, 0.05));
        assert!(v.is_blocked());

        let v = gate.evaluate(&decision(0.9, 100.0), &TicketMetadata::new("db", false, 0.0, 0.0));
        assert!(v.is_blocked());
    }

    #[test]
    fn test_no_matching_rule_falls_back_to_review() {
        let rules = PolicyRuleSet::new(vec![PolicyRule::new(
            "only-big",
            "",
            vec![Condition::CostDeltaAbove(0.9)],
            VerdictOutcome::Block,
        )])
        .unwrap();
        let gate = PolicyGate::new(rules).unwrap();
        let v = gate.evaluate(&decision(0.9, 100.0), &meta(0.03, 0.05));
        assert!(v.needs_review());
        assert_eq!(v.reasons, vec!["no policy rule matched".to_string()]);
    }

    #[test]
    fn test_admit_counts_verdicts() {
        let gate = PolicyGate::default();
        gate.admit(&decision(0.90, 100.0), &meta(0.03, 0.05));
        gate.admit(&decision(0.60, 100.0), &meta(0.03, 0.05));
        gate.admit(&decision(0.90, 100.0), &meta(0.12, 0.05));

        let snap = gate.stats().snapshot();
        assert_eq!(snap.evaluated, 3);
        assert_eq!(snap.auto_approved, 1);
        assert_eq!(snap.blocked, 1);
        assert_eq!(snap.manual_review, 1);
    }
}

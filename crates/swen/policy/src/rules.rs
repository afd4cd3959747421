//! Policy rules as data.
//!
//! A rule is a list of conditions (all must hold) and an outcome. Rules are
//! evaluated in order and the first match wins, so thresholds and ordering
//! live in configuration rather than in code.

use serde::{Deserialize, Serialize};
use swen_types::{Decision, VerdictOutcome};

use crate::error::{PolicyError, PolicyResult};
use crate::metadata::{RiskLevel, TicketMetadata};

/// Default thresholds for the derived rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    /// Maximum relative cost change for auto-approval.
    #[serde(default = "default_cost_delta_auto")]
    pub cost_delta_auto: f64,

    /// Relative cost change above which a change is blocked.
    #[serde(default = "default_cost_delta_block")]
    pub cost_delta_block: f64,

    /// Minimum confidence for auto-approval.
    #[serde(default = "default_confidence_auto")]
    pub confidence_auto: f64,

    /// Confidence below which a change is blocked.
    #[serde(default = "default_confidence_block")]
    pub confidence_block: f64,

    /// Maximum share of traffic affected for auto-approval.
    #[serde(default = "default_traffic_impact_auto")]
    pub traffic_impact_auto: f64,

    /// Minimum monthly savings for auto-approval.
    #[serde(default = "default_savings_floor")]
    pub savings_floor: f64,

    /// Highest risk level that may be auto-approved.
    #[serde(default = "default_max_risk")]
    pub max_risk: RiskLevel,

    /// Longest estimated downtime (minutes) that may be auto-approved.
    #[serde(default = "default_max_downtime")]
    pub max_downtime_minutes: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            cost_delta_auto: default_cost_delta_auto(),
            cost_delta_block: default_cost_delta_block(),
            confidence_auto: default_confidence_auto(),
            confidence_block: default_confidence_block(),
            traffic_impact_auto: default_traffic_impact_auto(),
            savings_floor: default_savings_floor(),
            max_risk: default_max_risk(),
            max_downtime_minutes: default_max_downtime(),
        }
    }
}

impl PolicyThresholds {
    pub fn validate(&self) -> PolicyResult<()> {
        let fractions = [
            ("cost_delta_auto", self.cost_delta_auto),
            ("cost_delta_block", self.cost_delta_block),
            ("confidence_auto", self.confidence_auto),
            ("confidence_block", self.confidence_block),
            ("traffic_impact_auto", self.traffic_impact_auto),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidThreshold(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.confidence_auto > 1.0 || self.confidence_block > 1.0 {
            return Err(PolicyError::InvalidThreshold(
                "confidence thresholds must be at most 1.0".to_string(),
            ));
        }
        if self.cost_delta_auto > self.cost_delta_block {
            return Err(PolicyError::InvalidThreshold(format!(
                "cost_delta_auto {} exceeds cost_delta_block {}",
                self.cost_delta_auto, self.cost_delta_block
            )));
        }
        if self.confidence_block > self.confidence_auto {
            return Err(PolicyError::InvalidThreshold(format!(
                "confidence_block {} exceeds confidence_auto {}",
                self.confidence_block, self.confidence_auto
            )));
        }
        if !self.savings_floor.is_finite() || !self.max_downtime_minutes.is_finite() {
            return Err(PolicyError::InvalidThreshold(
                "savings_floor and max_downtime_minutes must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Facts a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Facts<'a> {
    pub decision: &'a Decision,
    pub metadata: &'a TicketMetadata,
}

/// A single predicate over a decision and its ticket metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// Service holds state that a move would have to migrate.
    Stateful,
    CostDeltaAbove(f64),
    CostDeltaAtMost(f64),
    ConfidenceBelow(f64),
    ConfidenceAtLeast(f64),
    SavingsAtLeast(f64),
    TrafficImpactAtMost(f64),
    /// Holds when risk is unknown or at most the given level.
    RiskAtMost(RiskLevel),
    /// Holds when downtime is unknown or at most the given minutes.
    DowntimeAtMost(f64),
    /// Holds when any nested condition holds.
    Any(Vec<Condition>),
}

impl Condition {
    /// Evaluate the condition.
    pub fn holds(&self, facts: &Facts<'_>) -> bool {
        let d = facts.decision;
        let m = facts.metadata;
        match self {
            Condition::Stateful => m.stateful,
            Condition::CostDeltaAbove(t) => m.cost_delta > *t,
            Condition::CostDeltaAtMost(t) => m.cost_delta <= *t,
            Condition::ConfidenceBelow(t) => d.confidence < *t,
            Condition::ConfidenceAtLeast(t) => d.confidence >= *t,
            Condition::SavingsAtLeast(t) => d.predicted_monthly_savings >= *t,
            Condition::TrafficImpactAtMost(t) => m.traffic_impact <= *t,
            Condition::RiskAtMost(max) => m.risk.map_or(true, |r| r <= *max),
            Condition::DowntimeAtMost(max) => m.downtime_minutes.map_or(true, |d| d <= *max),
            Condition::Any(nested) => nested.iter().any(|c| c.holds(facts)),
        }
    }

    /// Human-readable statement of why the condition holds.
    pub fn describe(&self, facts: &Facts<'_>) -> String {
        let d = facts.decision;
        let m = facts.metadata;
        match self {
            Condition::Stateful => format!("{} is a stateful service", m.service),
            Condition::CostDeltaAbove(t) => format!(
                "cost delta {:.1}% exceeds {:.1}%",
                m.cost_delta * 100.0,
                t * 100.0
            ),
            Condition::CostDeltaAtMost(t) => format!(
                "cost delta {:.1}% within {:.1}%",
                m.cost_delta * 100.0,
                t * 100.0
            ),
            Condition::ConfidenceBelow(t) => format!(
                "confidence {:.0}% below {:.0}%",
                d.confidence * 100.0,
                t * 100.0
            ),
            Condition::ConfidenceAtLeast(t) => format!(
                "confidence {:.0}% at least {:.0}%",
                d.confidence * 100.0,
                t * 100.0
            ),
            Condition::SavingsAtLeast(t) => format!(
                "savings ${:.2}/month at least ${:.2}",
                d.predicted_monthly_savings, t
            ),
            Condition::TrafficImpactAtMost(t) => format!(
                "traffic impact {:.1}% within {:.1}%",
                m.traffic_impact * 100.0,
                t * 100.0
            ),
            Condition::RiskAtMost(max) => match m.risk {
                Some(r) => format!("risk {} within {}", r, max),
                None => "risk not assessed".to_string(),
            },
            Condition::DowntimeAtMost(max) => match m.downtime_minutes {
                Some(minutes) => format!("downtime {:.0}m within {:.0}m", minutes, max),
                None => "downtime not estimated".to_string(),
            },
            Condition::Any(nested) => nested
                .iter()
                .filter(|c| c.holds(facts))
                .map(|c| c.describe(facts))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn validate(&self, rule: &str) -> PolicyResult<()> {
        let bad = |reason: &str| PolicyError::InvalidRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Condition::CostDeltaAbove(t)
            | Condition::CostDeltaAtMost(t)
            | Condition::ConfidenceBelow(t)
            | Condition::ConfidenceAtLeast(t)
            | Condition::SavingsAtLeast(t)
            | Condition::TrafficImpactAtMost(t)
            | Condition::DowntimeAtMost(t) => {
                if t.is_finite() {
                    Ok(())
                } else {
                    Err(bad("threshold must be finite"))
                }
            }
            Condition::Any(nested) => {
                if nested.is_empty() {
                    return Err(bad("`any` needs at least one condition"));
                }
                nested.iter().try_for_each(|c| c.validate(rule))
            }
            Condition::Stateful | Condition::RiskAtMost(_) => Ok(()),
        }
    }
}

/// A named rule: all conditions must hold for the outcome to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Conditions that must all hold. Empty means always.
    #[serde(default)]
    pub when: Vec<Condition>,

    pub outcome: VerdictOutcome,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        when: Vec<Condition>,
        outcome: VerdictOutcome,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            when,
            outcome,
        }
    }

    pub fn matches(&self, facts: &Facts<'_>) -> bool {
        self.when.iter().all(|c| c.holds(facts))
    }

    /// Reasons recorded on the verdict when this rule matches.
    pub fn reasons(&self, facts: &Facts<'_>) -> Vec<String> {
        let mut reasons = vec![format!("{}: {}", self.id, self.description)];
        reasons.extend(self.when.iter().map(|c| c.describe(facts)));
        reasons
    }
}

/// Ordered rule list. The first matching rule decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRuleSet {
    pub rules: Vec<PolicyRule>,
}

impl PolicyRuleSet {
    /// Build from explicit rules, validating them.
    pub fn new(rules: Vec<PolicyRule>) -> PolicyResult<Self> {
        if rules.is_empty() {
            return Err(PolicyError::EmptyRuleSet);
        }
        for rule in &rules {
            if rule.id.trim().is_empty() {
                return Err(PolicyError::InvalidRule {
                    rule: "<unnamed>".to_string(),
                    reason: "rule id must not be empty".to_string(),
                });
            }
            rule.when.iter().try_for_each(|c| c.validate(&rule.id))?;
        }
        Ok(Self { rules })
    }

    /// Standard admission rules derived from thresholds:
    ///
    /// 1. stateful service → ManualReview
    /// 2. cost delta above block threshold, or confidence below block
    ///    threshold → Block
    /// 3. small cost delta, high confidence, savings above floor, limited
    ///    traffic impact, acceptable risk and downtime → AutoApprove
    /// 4. otherwise → ManualReview
    pub fn from_thresholds(t: &PolicyThresholds) -> Self {
        Self {
            rules: vec![
                PolicyRule::new(
                    "stateful-service",
                    "stateful services require manual review",
                    vec![Condition::Stateful],
                    VerdictOutcome::ManualReview,
                ),
                PolicyRule::new(
                    "excessive-risk",
                    "change is too large or too uncertain",
                    vec![Condition::Any(vec![
                        Condition::CostDeltaAbove(t.cost_delta_block),
                        Condition::ConfidenceBelow(t.confidence_block),
                    ])],
                    VerdictOutcome::Block,
                ),
                PolicyRule::new(
                    "auto-approve",
                    "all auto-approval criteria met",
                    vec![
                        Condition::CostDeltaAtMost(t.cost_delta_auto),
                        Condition::ConfidenceAtLeast(t.confidence_auto),
                        Condition::SavingsAtLeast(t.savings_floor),
                        Condition::TrafficImpactAtMost(t.traffic_impact_auto),
                        Condition::RiskAtMost(t.max_risk),
                        Condition::DowntimeAtMost(t.max_downtime_minutes),
                    ],
                    VerdictOutcome::AutoApprove,
                ),
                PolicyRule::new(
                    "default-review",
                    "change needs operator review",
                    Vec::new(),
                    VerdictOutcome::ManualReview,
                ),
            ],
        }
    }
}

impl Default for PolicyRuleSet {
    fn default() -> Self {
        Self::from_thresholds(&PolicyThresholds::default())
    }
}

// Default value helpers
fn default_cost_delta_auto() -> f64 {
    0.05
}

fn default_cost_delta_block() -> f64 {
    0.20
}

fn default_confidence_auto() -> f64 {
    0.85
}

fn default_confidence_block() -> f64 {
    0.70
}

fn default_traffic_impact_auto() -> f64 {
    0.10
}

fn default_savings_floor() -> f64 {
    50.0
}

fn default_max_risk() -> RiskLevel {
    RiskLevel::Medium
}

fn default_max_downtime() -> f64 {
    5.0
}

//! Per-service facts the gate needs beyond the decision itself.

use serde::{Deserialize, Serialize};
use swen_types::Decision;

/// Operator-assigned risk of moving a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Static profile of a service, usually from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    #[serde(default)]
    pub stateful: bool,

    /// Fraction of total traffic served, in [0, 1].
    #[serde(default)]
    pub traffic_impact: f64,

    #[serde(default)]
    pub risk: Option<RiskLevel>,

    #[serde(default)]
    pub downtime_minutes: Option<f64>,
}

/// Facts about the change a ticket would carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub service: String,
    pub stateful: bool,

    /// Relative hourly cost change, in [0, ∞).
    pub cost_delta: f64,

    /// Fraction of traffic affected, in [0, 1].
    pub traffic_impact: f64,

    pub risk: Option<RiskLevel>,
    pub downtime_minutes: Option<f64>,
}

impl TicketMetadata {
    pub fn new(service: impl Into<String>, stateful: bool, cost_delta: f64, traffic_impact: f64) -> Self {
        Self {
            service: service.into(),
            stateful,
            cost_delta,
            traffic_impact,
            risk: None,
            downtime_minutes: None,
        }
    }

    /// Combine a decision with the service's profile.
    pub fn for_decision(decision: &Decision, profile: &ServiceProfile) -> Self {
        Self {
            service: decision.service.clone(),
            stateful: profile.stateful,
            cost_delta: decision.cost_delta(),
            traffic_impact: profile.traffic_impact,
            risk: profile.risk,
            downtime_minutes: profile.downtime_minutes,
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_downtime(mut self, minutes: f64) -> Self {
        self.downtime_minutes = Some(minutes);
        self
    }
}

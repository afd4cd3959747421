//! Telemetry snapshot types.
//!
//! A snapshot is one immutable observation of every provider's metrics for
//! every managed service. Snapshots are superseded wholesale; nothing in this
//! module mutates a snapshot after construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SnapshotId;

/// Number of metrics a provider observation is expected to carry.
pub const REQUIRED_METRICS: usize = 4;

/// Raw metrics for one (service, provider) pair.
///
/// Every field is optional: feeds routinely drop values, and a missing
/// metric is scored as the worst possible value rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    /// Hourly cost in dollars.
    #[serde(default)]
    pub cost: Option<f64>,

    /// Observed latency in milliseconds.
    #[serde(default)]
    pub latency_ms: Option<f64>,

    /// Remaining credit balance (normalized against the configured cap).
    #[serde(default)]
    pub credit_balance: Option<f64>,

    /// Available capacity (normalized against the configured cap).
    #[serde(default)]
    pub available_capacity: Option<f64>,
}

impl ProviderMetrics {
    /// Create a fully populated observation.
    pub fn new(cost: f64, latency_ms: f64, credit_balance: f64, available_capacity: f64) -> Self {
        Self {
            cost: Some(cost),
            latency_ms: Some(latency_ms),
            credit_balance: Some(credit_balance),
            available_capacity: Some(available_capacity),
        }
    }

    /// Number of metrics that are present and finite.
    pub fn present_count(&self) -> usize {
        [
            self.cost,
            self.latency_ms,
            self.credit_balance,
            self.available_capacity,
        ]
        .iter()
        .filter(|v| v.map(f64::is_finite).unwrap_or(false))
        .count()
    }

    /// Fraction of required metrics that are usable, in [0, 1].
    pub fn completeness(&self) -> f64 {
        self.present_count() as f64 / REQUIRED_METRICS as f64
    }

    /// Hourly cost, if usable.
    pub fn usable_cost(&self) -> Option<f64> {
        self.cost.filter(|c| c.is_finite())
    }
}

/// Observations for a single service across candidate providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTelemetry {
    /// Provider the service currently runs on, when the feed reports it.
    #[serde(default)]
    pub current_provider: Option<String>,

    /// Per-provider metrics, ordered by provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderMetrics>,
}

/// One immutable telemetry observation for all services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Snapshot identifier.
    pub id: SnapshotId,

    /// When the snapshot was observed.
    pub observed_at: DateTime<Utc>,

    /// Service name to per-provider observations.
    pub services: BTreeMap<String, ServiceTelemetry>,
}

impl TelemetrySnapshot {
    /// Create a snapshot from already-collected observations.
    pub fn new(id: SnapshotId, services: BTreeMap<String, ServiceTelemetry>) -> Self {
        Self {
            id,
            observed_at: Utc::now(),
            services,
        }
    }

    /// Look up one service.
    pub fn service(&self, name: &str) -> Option<&ServiceTelemetry> {
        self.services.get(name)
    }

    /// Current assignments reported by the feed itself.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.services
            .iter()
            .filter_map(|(service, telemetry)| {
                telemetry
                    .current_provider
                    .as_ref()
                    .map(|provider| Assignment::new(service.clone(), provider.clone()))
            })
            .collect()
    }
}

/// Which provider a service currently runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub service: String,
    pub provider: String,
}

impl Assignment {
    pub fn new(service: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            provider: provider.into(),
        }
    }
}

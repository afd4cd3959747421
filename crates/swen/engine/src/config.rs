//! Engine configuration.
//!
//! Weights and thresholds are fixed configuration. They are validated once,
//! when configuration is loaded; scoring calls assume a validated config.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tolerance for the weights-sum-to-one check.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Configuration for scoring and decision making.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scoring weights.
    #[serde(default)]
    pub weights: WeightConfig,

    /// Normalization caps.
    #[serde(default)]
    pub caps: NormalizationCaps,

    /// Minimum confidence for a decision to be emitted.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Minimum predicted monthly savings (dollars) for a decision to be emitted.
    #[serde(default = "default_min_savings")]
    pub min_savings: f64,

    /// Hours used to project hourly cost to a month.
    #[serde(default = "default_hours_per_month")]
    pub hours_per_month: f64,

    /// Score gap at which separation stops adding confidence.
    #[serde(default = "default_gap_saturation")]
    pub gap_saturation: f64,

    /// Number of `(service, snapshot)` results remembered for idempotency.
    #[serde(default = "default_cache_capacity")]
    pub decision_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: WeightConfig::default(),
            caps: NormalizationCaps::default(),
            confidence_threshold: default_confidence_threshold(),
            min_savings: default_min_savings(),
            hours_per_month: default_hours_per_month(),
            gap_saturation: default_gap_saturation(),
            decision_cache_capacity: default_cache_capacity(),
        }
    }
}

impl EngineConfig {
    /// Validate every field.
    pub fn validate(&self) -> EngineResult<()> {
        self.weights.validate()?;
        self.caps.validate()?;

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !self.min_savings.is_finite() {
            return Err(EngineError::InvalidConfig(
                "min_savings must be finite".to_string(),
            ));
        }
        if !(self.hours_per_month.is_finite() && self.hours_per_month > 0.0) {
            return Err(EngineError::InvalidConfig(
                "hours_per_month must be positive".to_string(),
            ));
        }
        if !(self.gap_saturation.is_finite() && self.gap_saturation > 0.0) {
            return Err(EngineError::InvalidConfig(
                "gap_saturation must be positive".to_string(),
            ));
        }
        if self.decision_cache_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "decision_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scoring weights. Must be non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub cost: f64,
    pub latency: f64,
    pub credits: f64,
    pub availability: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            cost: 0.40,
            latency: 0.25,
            credits: 0.20,
            availability: 0.15,
        }
    }
}

impl WeightConfig {
    /// Create a weight set without validating it.
    pub fn new(cost: f64, latency: f64, credits: f64, availability: f64) -> Self {
        Self {
            cost,
            latency,
            credits,
            availability,
        }
    }

    pub fn sum(&self) -> f64 {
        self.cost + self.latency + self.credits + self.availability
    }

    /// Reject negative, non-finite or non-normalized weights.
    pub fn validate(&self) -> EngineResult<()> {
        let named = [
            ("cost", self.cost),
            ("latency", self.latency),
            ("credits", self.credits),
            ("availability", self.availability),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidWeights(format!(
                    "{} weight {} must be a non-negative number",
                    name, value
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidWeights(format!(
                "weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }
}

/// Caps used to normalize raw metrics into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationCaps {
    /// Hourly cost at or above which the cost score is 0.
    #[serde(default = "default_cost_cap")]
    pub cost: f64,

    /// Latency (ms) at or above which the latency score is 0.
    #[serde(default = "default_latency_cap")]
    pub latency_ms: f64,

    /// Credit balance at or above which the credit score is 1.
    #[serde(default = "default_unit_cap")]
    pub credits: f64,

    /// Capacity at or above which the availability score is 1.
    #[serde(default = "default_unit_cap")]
    pub availability: f64,
}

impl Default for NormalizationCaps {
    fn default() -> Self {
        Self {
            cost: default_cost_cap(),
            latency_ms: default_latency_cap(),
            credits: default_unit_cap(),
            availability: default_unit_cap(),
        }
    }
}

impl NormalizationCaps {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, cap) in [
            ("cost", self.cost),
            ("latency_ms", self.latency_ms),
            ("credits", self.credits),
            ("availability", self.availability),
        ] {
            if !(cap.is_finite() && cap > 0.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{} cap must be positive, got {}",
                    name, cap
                )));
            }
        }
        Ok(())
    }
}

// Default value helpers
fn default_confidence_threshold() -> f64 {
    0.70
}

fn default_min_savings() -> f64 {
    50.0
}

fn default_hours_per_month() -> f64 {
    720.0
}

fn default_gap_saturation() -> f64 {
    0.20
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_cost_cap() -> f64 {
    2.0
}

fn default_latency_cap() -> f64 {
    500.0
}

fn default_unit_cap() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = WeightConfig::new(0.5, 0.25, 0.20, 0.15);
        let err = weights.validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = WeightConfig::new(1.2, -0.2, 0.0, 0.0);
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_threshold_range_checked() {
        let config = EngineConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}

//! Provider scoring.
//!
//! Pure, total and deterministic: every metric maps into [0, 1], a missing
//! or non-finite metric scores 0 and produces a warning, and the weighted
//! total is clamped into [0, 1].

use swen_types::{ProviderMetrics, ProviderScore};
use tracing::warn;

use crate::config::{NormalizationCaps, WeightConfig};

/// Normalize a metric where lower raw values are better (cost, latency).
pub fn normalize_lower_better(value: f64, cap: f64) -> f64 {
    (1.0 - (value / cap).min(1.0)).clamp(0.0, 1.0)
}

/// Normalize a metric where higher raw values are better (credits, capacity).
pub fn normalize_higher_better(value: f64, cap: f64) -> f64 {
    (value / cap).min(1.0).clamp(0.0, 1.0)
}

/// Score one provider's metrics.
pub fn score(
    provider: &str,
    metrics: &ProviderMetrics,
    weights: &WeightConfig,
    caps: &NormalizationCaps,
) -> ProviderScore {
    let cost_score = component(provider, "cost", metrics.cost, |v| {
        normalize_lower_better(v, caps.cost)
    });
    let latency_score = component(provider, "latency_ms", metrics.latency_ms, |v| {
        normalize_lower_better(v, caps.latency_ms)
    });
    let credit_score = component(provider, "credit_balance", metrics.credit_balance, |v| {
        normalize_higher_better(v, caps.credits)
    });
    let availability_score = component(
        provider,
        "available_capacity",
        metrics.available_capacity,
        |v| normalize_higher_better(v, caps.availability),
    );

    let total = (weights.cost * cost_score
        + weights.latency * latency_score
        + weights.credits * credit_score
        + weights.availability * availability_score)
        .clamp(0.0, 1.0);

    ProviderScore {
        provider: provider.to_string(),
        cost_score,
        latency_score,
        credit_score,
        availability_score,
        total,
    }
}

fn component(
    provider: &str,
    metric: &'static str,
    value: Option<f64>,
    normalize: impl Fn(f64) -> f64,
) -> f64 {
    match value {
        Some(v) if v.is_finite() => normalize(v),
        _ => {
            warn!(provider = %provider, metric, "Missing metric scored as worst value");
            0.0
        }
    }
}

/// Scorer bound to a validated weight/cap configuration.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: WeightConfig,
    caps: NormalizationCaps,
}

impl Scorer {
    pub fn new(weights: WeightConfig, caps: NormalizationCaps) -> Self {
        Self { weights, caps }
    }

    pub fn weights(&self) -> &WeightConfig {
        &self.weights
    }

    /// Score one provider.
    pub fn score(&self, provider: &str, metrics: &ProviderMetrics) -> ProviderScore {
        score(provider, metrics, &self.weights, &self.caps)
    }

    /// Score every candidate, best first. Ties keep provider-name order.
    pub fn rank<'a, I>(&self, candidates: I) -> Vec<ProviderScore>
    where
        I: IntoIterator<Item = (&'a String, &'a ProviderMetrics)>,
    {
        let mut scores: Vec<ProviderScore> = candidates
            .into_iter()
            .map(|(provider, metrics)| self.score(provider, metrics))
            .collect();
        scores.sort_by(|a, b| b.total.total_cmp(&a.total));
        scores
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(WeightConfig::default(), NormalizationCaps::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_scores() {
        let scorer = Scorer::default();

        let aws = scorer.score("aws", &ProviderMetrics::new(1.30, 85.0, 0.2, 1.0));
        let alibaba = scorer.score("alibaba", &ProviderMetrics::new(0.85, 100.0, 0.5, 0.8));

        assert!(approx(aws.cost_score, 0.35));
        assert!(approx(aws.latency_score, 0.83));
        assert!(approx(aws.total, 0.5375));
        assert!(approx(alibaba.total, 0.65));
        assert!(alibaba.total > aws.total);
    }

    #[test]
    fn test_missing_metric_scores_zero() {
        let scorer = Scorer::default();
        let metrics = ProviderMetrics {
            cost: None,
            latency_ms: Some(0.0),
            credit_balance: Some(f64::NAN),
            available_capacity: Some(1.0),
        };

        let s = scorer.score("gcp", &metrics);
        assert_eq!(s.cost_score, 0.0);
        assert_eq!(s.credit_score, 0.0);
        assert!(approx(s.latency_score, 1.0));
        assert!(approx(s.total, 0.25 + 0.15));
    }

    #[test]
    fn test_values_beyond_caps_are_clamped() {
        assert_eq!(normalize_lower_better(10.0, 2.0), 0.0);
        assert_eq!(normalize_lower_better(-1.0, 2.0), 1.0);
        assert_eq!(normalize_higher_better(4.0, 1.0), 1.0);
        assert_eq!(normalize_higher_better(-3.0, 1.0), 0.0);
    }

    #[test]
    fn test_rank_orders_best_first() {
        let scorer = Scorer::default();
        let mut providers = BTreeMap::new();
        providers.insert("aws".to_string(), ProviderMetrics::new(1.30, 85.0, 0.2, 1.0));
        providers.insert("alibaba".to_string(), ProviderMetrics::new(0.85, 100.0, 0.5, 0.8));

        let ranked = scorer.rank(&providers);
        assert_eq!(ranked[0].provider, "alibaba");
        assert_eq!(ranked[1].provider, "aws");
    }
}

//! Property tests: scores stay in range and confidence is monotone in the
//! score gap.

use proptest::prelude::*;
use swen_engine::{confidence, score, NormalizationCaps, WeightConfig};
use swen_types::ProviderMetrics;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// Generate a metric value that may be missing, non-finite or out of range.
fn arb_metric() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        4 => (-10.0f64..1000.0).prop_map(Some),
        1 => Just(None),
        1 => Just(Some(f64::NAN)),
        1 => Just(Some(f64::INFINITY)),
    ]
}

fn arb_metrics() -> impl Strategy<Value = ProviderMetrics> {
    (arb_metric(), arb_metric(), arb_metric(), arb_metric()).prop_map(
        |(cost, latency_ms, credit_balance, available_capacity)| ProviderMetrics {
            cost,
            latency_ms,
            credit_balance,
            available_capacity,
        },
    )
}

/// Generate non-negative weights normalized to sum to one.
fn arb_weights() -> impl Strategy<Value = WeightConfig> {
    (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.01f64..1.0).prop_map(|(a, b, c, d)| {
        let sum = a + b + c + d;
        let cost = a / sum;
        let latency = b / sum;
        let credits = c / sum;
        WeightConfig::new(cost, latency, credits, 1.0 - cost - latency - credits)
    })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Every component and the total are within [0, 1] for any input.
    #[test]
    fn score_components_in_unit_range(metrics in arb_metrics(), weights in arb_weights()) {
        prop_assume!(weights.validate().is_ok());
        let s = score("p", &metrics, &weights, &NormalizationCaps::default());

        for v in [s.cost_score, s.latency_score, s.credit_score, s.availability_score, s.total] {
            prop_assert!((0.0..=1.0).contains(&v), "value {} out of range", v);
        }
    }

    /// A wider gap between the top two candidates never lowers confidence.
    #[test]
    fn confidence_monotone_in_gap(
        runner_up in 0.0f64..1.0,
        narrow in 0.0f64..1.0,
        extra in 0.0f64..1.0,
        completeness in 0.0f64..=1.0,
        saturation in 0.01f64..1.0,
    ) {
        let narrow_best = (runner_up + narrow).min(1.0);
        let wide_best = (narrow_best + extra).min(1.0);

        let c_narrow = confidence(narrow_best, Some(runner_up), completeness, saturation);
        let c_wide = confidence(wide_best, Some(runner_up), completeness, saturation);

        prop_assert!(c_wide >= c_narrow);
        prop_assert!((0.0..=1.0).contains(&c_narrow));
        prop_assert!((0.0..=1.0).contains(&c_wide));
    }

    /// Less complete data never raises confidence.
    #[test]
    fn confidence_monotone_in_completeness(
        best in 0.0f64..1.0,
        runner_up in 0.0f64..1.0,
        low in 0.0f64..=1.0,
        high in 0.0f64..=1.0,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        prop_assert!(confidence(best, Some(runner_up), low, 0.2) <= confidence(best, Some(runner_up), high, 0.2));
    }
}

#[test]
fn default_weights_validate() {
    WeightConfig::default().validate().unwrap();
}

//! Decision confidence.
//!
//! `confidence = completeness × (0.5 + 0.5 × min(gap / saturation, 1))`
//!
//! `gap` is the score difference between the best and the runner-up
//! candidate (a missing runner-up counts as a zero score). `completeness` is
//! the fraction of required metrics present for the candidates being
//! compared. The result is non-decreasing in `gap` and in `completeness`.

/// Compute confidence in [0, 1].
pub fn confidence(
    best_total: f64,
    runner_up_total: Option<f64>,
    completeness: f64,
    gap_saturation: f64,
) -> f64 {
    let gap = (best_total - runner_up_total.unwrap_or(0.0)).max(0.0);
    let separation = if gap_saturation > 0.0 {
        (gap / gap_saturation).min(1.0)
    } else {
        1.0
    };
    let completeness = if completeness.is_finite() {
        completeness.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let value = completeness * (0.5 + 0.5 * separation);
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_gap() {
        let c = confidence(0.65, Some(0.5375), 1.0, 0.2);
        assert!((c - 0.78125).abs() < 1e-9);
    }

    #[test]
    fn test_wider_gap_is_not_less_confident() {
        let narrow = confidence(0.60, Some(0.55), 1.0, 0.2);
        let wide = confidence(0.70, Some(0.55), 1.0, 0.2);
        assert!(wide >= narrow);
    }

    #[test]
    fn test_incomplete_data_lowers_confidence() {
        let full = confidence(0.9, Some(0.3), 1.0, 0.2);
        let partial = confidence(0.9, Some(0.3), 0.75, 0.2);
        assert_eq!(full, 1.0);
        assert!(partial < full);
    }

    #[test]
    fn test_single_candidate_uses_zero_runner_up() {
        assert_eq!(confidence(0.4, None, 1.0, 0.2), 1.0);
    }

    #[test]
    fn test_nan_gap_scores_as_no_gap_and_nan_completeness_as_zero() {
        assert_eq!(confidence(f64::NAN, Some(0.1), 1.0, 0.2), 0.5);
        assert_eq!(confidence(0.5, Some(0.1), f64::NAN, 0.2), 0.0);
    }
}

//! Deterministic quantiles by linear interpolation between order statistics.

/// Linear-interpolated quantile over finite values.
///
/// Position `q * (n - 1)` in the sorted values, interpolated between its
/// neighbours. `None` for an empty slice or `q` outside [0, 1].
#[must_use]
pub fn linear_quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    if values.len() == 1 {
        return Some(values[0]);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let pos = q * ((sorted.len() - 1) as f64);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    if lo == hi {
        return Some(sorted[lo]);
    }
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - lo as f64;
    Some(sorted[lo].mul_add(1.0 - frac, sorted[hi] * frac))
}

/// Weighted quantile of `(value, weight)` samples sorted by value.
///
/// Sample `k` (1-based) sits at position `(C_k - w_k) / (W - w_k)`, where
/// `C_k` is the cumulative weight and `W` the total. The first sample is at
/// 0, the last at 1, and positions strictly increase in between. Between
/// positions the value is interpolated linearly. Reversing the order maps
/// each position `p` to `1 - p`, so `q(X, p) == -q(-X, 1 - p)`. With equal
/// weights this is exactly [`linear_quantile`].
///
/// Weights must be positive. `None` for no samples or `q` outside [0, 1].
#[must_use]
pub fn weighted_quantile(sorted: &[(f64, f64)], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let (&(first, _), rest) = sorted.split_first()?;
    let Some(&(last, _)) = rest.last() else {
        return Some(first);
    };

    let total: f64 = sorted.iter().map(|(_, w)| w).sum();

    let mut cumulative = 0.0;
    let mut prev: Option<(f64, f64)> = None;
    for &(value, weight) in sorted {
        let span = total - weight;
        if span <= 0.0 {
            return Some(value);
        }
        let pos = (cumulative / span).min(1.0);
        cumulative += weight;
        if pos >= q {
            return Some(match prev {
                Some((prev_pos, prev_value)) if pos > prev_pos => {
                    let frac = (q - prev_pos) / (pos - prev_pos);
                    prev_value.mul_add(1.0 - frac, value * frac)
                }
                _ => value,
            });
        }
        prev = Some((pos, value));
    }

    Some(last)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn linear_quantile_matches_numpy_linear() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((linear_quantile(&values, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert!((linear_quantile(&values, 0.1).unwrap() - 1.3).abs() < 1e-12);
        assert!((linear_quantile(&values, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((linear_quantile(&values, 1.0).unwrap() - 4.0).abs() < 1e-12);
        assert_eq!(linear_quantile(&[], 0.5), None);
        assert_eq!(linear_quantile(&values, 1.5), None);
    }

    #[test]
    fn weighted_single_sample() {
        assert_eq!(weighted_quantile(&[(7.0, 0.3)], 0.9), Some(7.0));
        assert_eq!(weighted_quantile(&[], 0.5), None);
    }

    #[test]
    fn heavier_sample_pulls_median() {
        let equal = [(0.0, 1.0), (5.0, 1.0), (10.0, 1.0)];
        assert!((weighted_quantile(&equal, 0.5).unwrap() - 5.0).abs() < 1e-12);

        // Positions 0, 2/3, 1: the median falls between 0 and 5.
        let heavy_low = [(0.0, 2.0), (5.0, 1.0), (10.0, 1.0)];
        assert!((weighted_quantile(&heavy_low, 0.5).unwrap() - 3.75).abs() < 1e-12);

        // Positions 0, 1/3, 1: the same pull from the top.
        let heavy_high = [(-10.0, 1.0), (-5.0, 1.0), (0.0, 2.0)];
        assert!((weighted_quantile(&heavy_high, 0.5).unwrap() + 3.75).abs() < 1e-12);
    }

    #[test]
    fn heavy_top_sample_is_not_ignored() {
        let top = [(0.0, 1.0), (5.0, 1.0), (10.0, 100.0)];
        let bottom = [(0.0, 100.0), (5.0, 1.0), (10.0, 1.0)];
        let top_median = weighted_quantile(&top, 0.5).unwrap();
        let bottom_median = weighted_quantile(&bottom, 0.5).unwrap();
        assert!(top_median > 5.0);
        assert!((top_median - (10.0 - bottom_median)).abs() < 1e-12);
        assert!((bottom_median - 2.525).abs() < 1e-9);
    }

    #[test]
    fn weighted_endpoints_are_min_and_max() {
        let samples = [(1.0, 0.5), (2.0, 0.8), (5.0, 0.05)];
        assert!((weighted_quantile(&samples, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((weighted_quantile(&samples, 1.0).unwrap() - 5.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn equal_weights_reduce_to_linear(
            mut values in prop::collection::vec(-100.0f64..100.0, 1..40),
            q in 0.0f64..=1.0,
            w in 0.05f64..1.0,
        ) {
            values.sort_by(f64::total_cmp);
            let samples: Vec<(f64, f64)> = values.iter().map(|&v| (v, w)).collect();
            let weighted = weighted_quantile(&samples, q).unwrap();
            let linear = linear_quantile(&values, q).unwrap();
            prop_assert!((weighted - linear).abs() < 1e-9, "{weighted} vs {linear}");
        }

        #[test]
        fn weighted_quantile_is_within_range(
            mut samples in prop::collection::vec((-100.0f64..100.0, 0.01f64..1.0), 1..40),
            q in 0.0f64..=1.0,
        ) {
            samples.sort_by(|a, b| a.0.total_cmp(&b.0));
            let v = weighted_quantile(&samples, q).unwrap();
            prop_assert!(v >= samples[0].0 - 1e-9 && v <= samples[samples.len() - 1].0 + 1e-9);
        }

        #[test]
        fn weighted_quantile_is_symmetric_under_reflection(
            mut samples in prop::collection::vec((-100.0f64..100.0, 0.05f64..1.0), 1..40),
            q in 0.0f64..=1.0,
        ) {
            samples.sort_by(|a, b| a.0.total_cmp(&b.0));
            let reflected: Vec<(f64, f64)> = samples.iter().rev().map(|&(v, w)| (-v, w)).collect();
            let direct = weighted_quantile(&samples, q).unwrap();
            let mirrored = -weighted_quantile(&reflected, 1.0 - q).unwrap();
            prop_assert!((direct - mirrored).abs() < 1e-6, "{direct} vs {mirrored}");
        }
    }
}

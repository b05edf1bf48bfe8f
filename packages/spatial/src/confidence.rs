//! Confidence scoring for point-to-polygon attributions.
//!
//! The error radius is compared against the matched unit's own scale (its
//! equivalent diameter) rather than an absolute distance, because unit
//! areas vary by orders of magnitude. The lowest tier is never zero, so
//! weak evidence stays in weighted statistics at low weight.

use geo_coverage_models::{Confidence, ConfidenceLadder, ConfigError};

/// Maps `(error radius, unit diameter, exact flag)` to a [`Confidence`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScorer {
    precise_radius_m: f64,
    absolute_radius_m: f64,
    tiers: [Confidence; 6],
}

impl ConfidenceScorer {
    /// Builds a scorer from a validated ladder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the ladder's tiers are out of
    /// range or increase.
    pub fn new(ladder: &ConfidenceLadder) -> Result<Self, ConfigError> {
        ladder.validate()?;

        let mut tiers = [Confidence::ONE; 6];
        for (slot, value) in tiers.iter_mut().zip(ladder.tiers()) {
            *slot = Confidence::new(value).map_err(|e| ConfigError::Invalid {
                field: "confidence",
                message: e.to_string(),
            })?;
        }

        Ok(Self {
            precise_radius_m: ladder.precise_radius_m,
            absolute_radius_m: ladder.absolute_radius_m,
            tiers,
        })
    }

    /// Scores one attribution. The first matching tier wins:
    ///
    /// | condition                                  | default |
    /// |--------------------------------------------|---------|
    /// | exact, no radius, or radius < 50 m         | 1.0     |
    /// | radius < diameter / 2                      | 0.8     |
    /// | radius < diameter                          | 0.5     |
    /// | radius < 2 * diameter                      | 0.3     |
    /// | radius < 1000 m                            | 0.15    |
    /// | otherwise                                  | 0.05    |
    ///
    /// Non-increasing in `error_radius_m` for a fixed diameter.
    #[must_use]
    pub fn score(&self, error_radius_m: Option<f64>, diameter_m: f64, is_exact: bool) -> Confidence {
        let [precise, half, full, double, absolute, floor] = self.tiers;

        let Some(radius) = error_radius_m else {
            return precise;
        };
        if is_exact || radius < self.precise_radius_m {
            precise
        } else if radius < diameter_m / 2.0 {
            half
        } else if radius < diameter_m {
            full
        } else if radius < 2.0 * diameter_m {
            double
        } else if radius < self.absolute_radius_m {
            absolute
        } else {
            floor
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(&ConfidenceLadder::default()).unwrap()
    }

    #[test]
    fn ladder_tiers() {
        let s = scorer();
        let d = 5000.0;
        assert_eq!(s.score(Some(10.0), d, false).get(), 1.0);
        assert_eq!(s.score(Some(2000.0), d, false).get(), 0.8);
        assert_eq!(s.score(Some(3000.0), d, false).get(), 0.5);
        assert_eq!(s.score(Some(9000.0), d, false).get(), 0.3);
        assert_eq!(s.score(Some(20_000.0), d, false).get(), 0.05);
    }

    #[test]
    fn absolute_tier_applies_to_small_units() {
        // 200 m unit: 500 m is beyond twice the diameter but under 1 km.
        let s = scorer();
        assert_eq!(s.score(Some(500.0), 200.0, false).get(), 0.15);
        assert_eq!(s.score(Some(1000.0), 200.0, false).get(), 0.05);
    }

    #[test]
    fn small_radius_is_precise_regardless_of_flag() {
        assert_eq!(scorer().score(Some(10.0), 5000.0, false), Confidence::ONE);
    }

    #[test]
    fn exact_flag_overrides_radius() {
        assert_eq!(scorer().score(Some(50_000.0), 100.0, true), Confidence::ONE);
        assert_eq!(scorer().score(None, 100.0, false), Confidence::ONE);
    }

    #[test]
    fn custom_ladder_is_used() {
        let ladder = ConfidenceLadder {
            floor: 0.01,
            ..ConfidenceLadder::default()
        };
        let s = ConfidenceScorer::new(&ladder).unwrap();
        assert_eq!(s.score(Some(1e6), 10.0, false).get(), 0.01);
    }

    #[test]
    fn invalid_ladder_is_rejected() {
        let ladder = ConfidenceLadder {
            within_half_diameter: 1.5,
            ..ConfidenceLadder::default()
        };
        assert!(ConfidenceScorer::new(&ladder).is_err());
    }

    proptest! {
        #[test]
        fn score_is_monotone_in_radius(
            diameter in 1.0f64..100_000.0,
            a in 0.0f64..200_000.0,
            b in 0.0f64..200_000.0,
        ) {
            let s = scorer();
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(s.score(Some(large), diameter, false) <= s.score(Some(small), diameter, false));
        }

        #[test]
        fn score_is_never_zero(diameter in 0.0f64..100_000.0, radius in 0.0f64..1e7) {
            let c = scorer().score(Some(radius), diameter, false).get();
            prop_assert!(c > 0.0 && c <= 1.0);
        }
    }
}

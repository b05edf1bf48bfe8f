//! Mergeable weighted statistics for one group key.

use std::collections::BTreeSet;

use geo_coverage_models::{AggregateBucket, QuantileValue};

use crate::quantile::weighted_quantile;

/// Running sums and the exact weighted sample of one bucket.
///
/// Two accumulators over disjoint records merge into the accumulator of
/// their union: sums add, samples concatenate, user sets union.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedAccumulator {
    record_count: u64,
    sum_w: f64,
    sum_w2: f64,
    sum_wx: f64,
    min: Option<f64>,
    max: Option<f64>,
    samples: Vec<(f64, f64)>,
    users: BTreeSet<String>,
}

impl WeightedAccumulator {
    /// Adds one finite value with a positive weight.
    pub fn push(&mut self, value: f64, weight: f64, user_id: Option<&str>) {
        self.record_count += 1;
        self.sum_w += weight;
        self.sum_w2 += weight * weight;
        self.sum_wx += weight * value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.samples.push((value, weight));
        if let Some(user) = user_id {
            self.users.insert(user.to_string());
        }
    }

    /// Folds `other` into this accumulator.
    pub fn merge(&mut self, other: Self) {
        self.record_count += other.record_count;
        self.sum_w += other.sum_w;
        self.sum_w2 += other.sum_w2;
        self.sum_wx += other.sum_wx;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.samples.extend(other.samples);
        self.users.extend(other.users);
    }

    /// Number of records pushed.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Sum of weights.
    #[must_use]
    pub const fn weighted_count(&self) -> f64 {
        self.sum_w
    }

    /// Weighted mean, or `None` when empty.
    #[must_use]
    pub fn weighted_mean(&self) -> Option<f64> {
        (self.sum_w > 0.0).then(|| self.sum_wx / self.sum_w)
    }

    /// Weighted sample standard deviation with reliability-weight
    /// correction, `sqrt(sum(w * (x - mean)^2) / (V1 - V2 / V1))`.
    ///
    /// Reduces to the `n - 1` sample deviation with unit weights. `None`
    /// for fewer than two records.
    #[must_use]
    pub fn weighted_std(&self) -> Option<f64> {
        let mean = self.weighted_mean()?;
        let denominator = self.sum_w - self.sum_w2 / self.sum_w;
        if self.record_count < 2 || denominator <= 0.0 {
            return None;
        }
        let squares: f64 = self
            .samples
            .iter()
            .map(|&(x, w)| w * (x - mean) * (x - mean))
            .sum();
        Some((squares / denominator).max(0.0).sqrt())
    }

    /// Closes the accumulator into a bucket. Quantiles are computed in the
    /// order of `quantiles`. `None` when nothing was pushed.
    #[must_use]
    pub fn finish(mut self, key: Vec<String>, quantiles: &[f64]) -> Option<AggregateBucket> {
        let weighted_mean = self.weighted_mean()?;
        let weighted_std = self.weighted_std();
        let (min, max) = (self.min?, self.max?);

        self.samples
            .sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let quantiles = quantiles
            .iter()
            .filter_map(|&q| {
                weighted_quantile(&self.samples, q).map(|value| QuantileValue { q, value })
            })
            .collect();

        Some(AggregateBucket {
            key,
            record_count: self.record_count,
            user_count: self.users.len() as u64,
            weighted_count: self.sum_w,
            weighted_mean,
            weighted_std,
            min,
            max,
            quantiles,
        })
    }
}

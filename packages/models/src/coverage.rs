//! Coverage records and inequality-curve outputs.

use serde::{Deserialize, Serialize};

/// Representativeness of one polygon unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    /// Polygon unit identifier.
    pub unit_id: String,
    /// Observed weighted activity `T_i`.
    pub activity: f64,
    /// Population `P_i`, always positive.
    pub population: i64,
    /// `(T_i / ΣT) / (P_i / ΣP)`.
    pub coverage_ratio: f64,
    /// `log2(CR_i)`; `None` when the unit has no activity.
    pub log2_coverage_ratio: Option<f64>,
    /// True when the unit falls below the minimum-sample threshold and must
    /// be left out of published representativeness statistics.
    pub masked: bool,
}

impl CoverageRecord {
    /// Whether this unit may appear in published statistics.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        !self.masked
    }

    /// Activity per resident, `T_i / P_i`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_capita(&self) -> f64 {
        self.activity / self.population as f64
    }
}

/// One vertex of a Lorenz curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorenzPoint {
    /// Cumulative share of population, in [0, 1].
    pub cum_population_share: f64,
    /// Cumulative share of activity, in [0, 1].
    pub cum_activity_share: f64,
}

/// A Lorenz curve over reportable units and its Gini coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorenzCurve {
    /// Curve vertices starting at the origin, ordered by per-capita activity.
    pub points: Vec<LorenzPoint>,
    /// `1 - 2 * area under the curve`.
    pub gini: f64,
}

/// Headline representativeness figures for a validated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Units evaluated (population > 0).
    pub units_total: usize,
    /// Units passing the minimum-sample threshold.
    pub reportable_units: usize,
    /// Units below the minimum-sample threshold.
    pub masked_units: usize,
    /// Share of evaluated population living in reportable units.
    pub covered_population_share: f64,
    /// 10th percentile of `log2(CR)` over reportable units with activity.
    pub log2_cr_p10: Option<f64>,
    /// Median of `log2(CR)` over reportable units with activity.
    pub log2_cr_p50: Option<f64>,
    /// 90th percentile of `log2(CR)` over reportable units with activity.
    pub log2_cr_p90: Option<f64>,
    /// Gini coefficient of the reportable units' Lorenz curve.
    pub gini: f64,
}

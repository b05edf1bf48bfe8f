//! Coverage ratio and minimum-sample masking.

use std::collections::BTreeMap;

use geo_coverage_aggregate::linear_quantile;
use geo_coverage_models::{CoverageRecord, ValidationSummary};

use crate::ValidationError;

/// Coverage of every evaluated unit plus the totals it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// One record per unit with positive population, ordered by unit id.
    pub records: Vec<CoverageRecord>,
    /// Units left out because their population is zero or negative.
    pub excluded_units: usize,
    /// `ΣT` over evaluated units.
    pub total_activity: f64,
    /// `ΣP` over evaluated units.
    pub total_population: i64,
    /// Threshold the mask flags were computed with.
    pub min_sample_threshold: f64,
}

impl CoverageReport {
    /// Units that may appear in published statistics.
    pub fn reportable(&self) -> impl Iterator<Item = &CoverageRecord> {
        self.records.iter().filter(|r| r.is_reportable())
    }

    /// Units suppressed by the threshold.
    pub fn masked(&self) -> impl Iterator<Item = &CoverageRecord> {
        self.records.iter().filter(|r| r.masked)
    }

    /// Headline figures over reportable units, with a precomputed Gini.
    #[must_use]
    pub fn summary(&self, gini: f64) -> ValidationSummary {
        let reportable: Vec<&CoverageRecord> = self.reportable().collect();
        let covered: i64 = reportable.iter().map(|r| r.population).sum();
        #[allow(clippy::cast_precision_loss)]
        let covered_population_share = if self.total_population > 0 {
            covered as f64 / self.total_population as f64
        } else {
            0.0
        };

        let log2: Vec<f64> = reportable
            .iter()
            .filter_map(|r| r.log2_coverage_ratio)
            .collect();

        ValidationSummary {
            units_total: self.records.len(),
            reportable_units: reportable.len(),
            masked_units: self.records.len() - reportable.len(),
            covered_population_share,
            log2_cr_p10: linear_quantile(&log2, 0.10),
            log2_cr_p50: linear_quantile(&log2, 0.50),
            log2_cr_p90: linear_quantile(&log2, 0.90),
            gini,
        }
    }
}

/// Computes coverage ratios and mask flags.
///
/// Every unit in `population` with a positive population is evaluated,
/// including units without activity. Units with population ≤ 0 are left
/// out of both totals. `CR_i = (T_i / ΣT) / (P_i / ΣP)`, and a unit is
/// masked when `T_i < min_sample_threshold`.
///
/// # Errors
///
/// Returns [`ValidationError::MissingPopulation`] when a unit with activity
/// has no population entry, [`ValidationError::InvalidActivity`] for
/// negative or non-finite activity, and
/// [`ValidationError::ZeroTotalPopulation`] or
/// [`ValidationError::ZeroTotalActivity`] for degenerate totals.
pub fn evaluate(
    activity: &BTreeMap<String, f64>,
    population: &BTreeMap<String, i64>,
    min_sample_threshold: f64,
) -> Result<CoverageReport, ValidationError> {
    for (unit_id, &t) in activity {
        if !t.is_finite() || t < 0.0 {
            return Err(ValidationError::InvalidActivity {
                unit_id: unit_id.clone(),
                activity: t,
            });
        }
        if !population.contains_key(unit_id) {
            return Err(ValidationError::MissingPopulation {
                unit_id: unit_id.clone(),
            });
        }
    }

    let mut excluded_units = 0;
    let mut dropped_activity = 0.0;
    let mut evaluated: Vec<(&String, f64, i64)> = Vec::with_capacity(population.len());
    for (unit_id, &p) in population {
        let t = activity.get(unit_id).copied().unwrap_or(0.0);
        if p <= 0 {
            excluded_units += 1;
            dropped_activity += t;
            continue;
        }
        evaluated.push((unit_id, t, p));
    }
    if dropped_activity > 0.0 {
        log::warn!(
            "Ignoring {dropped_activity} activity in {excluded_units} units without population"
        );
    }

    let total_population: i64 = evaluated.iter().map(|(_, _, p)| p).sum();
    if total_population <= 0 {
        return Err(ValidationError::ZeroTotalPopulation);
    }
    let total_activity: f64 = evaluated.iter().map(|(_, t, _)| t).sum();
    if total_activity <= 0.0 {
        return Err(ValidationError::ZeroTotalActivity);
    }

    #[allow(clippy::cast_precision_loss)]
    let records: Vec<CoverageRecord> = evaluated
        .into_iter()
        .map(|(unit_id, t, p)| {
            let coverage_ratio = (t / total_activity) / (p as f64 / total_population as f64);
            CoverageRecord {
                unit_id: unit_id.clone(),
                activity: t,
                population: p,
                coverage_ratio,
                log2_coverage_ratio: (coverage_ratio > 0.0).then(|| coverage_ratio.log2()),
                masked: t < min_sample_threshold,
            }
        })
        .collect();

    let masked = records.iter().filter(|r| r.masked).count();
    log::info!(
        "Evaluated {} units: {} reportable, {masked} masked, {excluded_units} excluded",
        records.len(),
        records.len() - masked,
    );

    Ok(CoverageReport {
        records,
        excluded_units,
        total_activity,
        total_population,
        min_sample_threshold,
    })
}

/// Re-evaluates a previously written coverage table, e.g. with a new
/// threshold. Only `activity` and `population` are read; ratios and flags
/// are recomputed, so re-running with the same threshold is a no-op.
///
/// # Errors
///
/// Returns [`ValidationError`] under the same conditions as [`evaluate`].
pub fn evaluate_records(
    records: &[CoverageRecord],
    min_sample_threshold: f64,
) -> Result<CoverageReport, ValidationError> {
    let activity = records
        .iter()
        .map(|r| (r.unit_id.clone(), r.activity))
        .collect();
    let population = records
        .iter()
        .map(|r| (r.unit_id.clone(), r.population))
        .collect();
    evaluate(&activity, &population, min_sample_threshold)
}

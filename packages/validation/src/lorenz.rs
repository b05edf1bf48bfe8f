//! Lorenz curve and Gini coefficient of activity versus population.

use geo_coverage_models::{CoverageRecord, LorenzCurve, LorenzPoint};

use crate::ValidationError;

/// Builds the Lorenz curve over the reportable records in `records`.
///
/// Units are ordered ascending by per-capita activity `T_i / P_i` with a
/// stable sort, so equal rates keep their input order. The curve starts at
/// the origin and ends at `(1, 1)`; the Gini coefficient is
/// `1 - 2 * (trapezoidal area under the curve)`. Masked records are
/// ignored.
///
/// # Errors
///
/// Returns [`ValidationError::NoReportableUnits`] when no record is
/// reportable and [`ValidationError::ZeroReportableActivity`] when the
/// reportable records carry no activity.
pub fn build_lorenz(records: &[CoverageRecord]) -> Result<LorenzCurve, ValidationError> {
    let mut reportable: Vec<&CoverageRecord> = records.iter().filter(|r| r.is_reportable()).collect();
    if reportable.is_empty() {
        return Err(ValidationError::NoReportableUnits);
    }

    #[allow(clippy::cast_precision_loss)]
    let total_population: f64 = reportable.iter().map(|r| r.population as f64).sum();
    let total_activity: f64 = reportable.iter().map(|r| r.activity).sum();
    if total_activity <= 0.0 {
        return Err(ValidationError::ZeroReportableActivity);
    }

    reportable.sort_by(|a, b| a.per_capita().total_cmp(&b.per_capita()));

    let mut points = Vec::with_capacity(reportable.len() + 1);
    points.push(LorenzPoint {
        cum_population_share: 0.0,
        cum_activity_share: 0.0,
    });

    let (mut cum_p, mut cum_t) = (0.0, 0.0);
    for record in reportable {
        #[allow(clippy::cast_precision_loss)]
        let population = record.population as f64;
        cum_p += population;
        cum_t += record.activity;
        points.push(LorenzPoint {
            cum_population_share: cum_p / total_population,
            cum_activity_share: cum_t / total_activity,
        });
    }

    let area: f64 = points
        .windows(2)
        .map(|w| {
            (w[1].cum_population_share - w[0].cum_population_share)
                * (w[1].cum_activity_share + w[0].cum_activity_share)
                / 2.0
        })
        .sum();
    let gini = 2.0f64.mul_add(-area, 1.0);

    log::info!("Lorenz curve over {} units: Gini {gini:.4}", points.len() - 1);

    Ok(LorenzCurve { points, gini })
}

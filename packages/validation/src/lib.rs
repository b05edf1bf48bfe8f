#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Representativeness validation of attributed activity.
//!
//! Compares each unit's share of weighted activity with its share of
//! population (the coverage ratio), masks units whose sample is too small
//! to support a claim, and measures how unequally activity is spread over
//! the remaining units with a Lorenz curve and Gini coefficient.
//!
//! Degenerate inputs (no population, no activity, nothing reportable) are
//! errors, never NaN.

pub mod coverage;
pub mod lorenz;

pub use coverage::{CoverageReport, evaluate, evaluate_records};
pub use lorenz::build_lorenz;

use thiserror::Error;

/// Errors raised by coverage evaluation and the Lorenz builder.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A unit has activity but no population figure.
    #[error("No population for unit {unit_id}")]
    MissingPopulation {
        /// The unit lacking population.
        unit_id: String,
    },

    /// A unit's activity is negative or not finite.
    #[error("Invalid activity {activity} for unit {unit_id}")]
    InvalidActivity {
        /// The offending unit.
        unit_id: String,
        /// The rejected activity.
        activity: f64,
    },

    /// No unit has positive population.
    #[error("Total population is zero")]
    ZeroTotalPopulation,

    /// No activity falls in units with positive population.
    #[error("Total activity is zero")]
    ZeroTotalActivity,

    /// Every unit is masked; the Lorenz curve is undefined.
    #[error("No reportable units")]
    NoReportableUnits,

    /// Reportable units carry no activity; the Lorenz curve is undefined.
    #[error("Reportable units have zero total activity")]
    ZeroReportableActivity,
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Exact, confidence-weighted aggregation of attributed records.
//!
//! Every granularity (day x unit, year x month x unit, ...) is its own
//! pass over the attributed records. Partial results built on separate
//! partitions merge by summing weights and concatenating the exact samples,
//! so the merged table is identical to a single-pass one.

pub mod accumulator;
pub mod aggregator;
pub mod quantile;

pub use accumulator::WeightedAccumulator;
pub use aggregator::{Aggregator, PartialAggregate, activity_by_unit};
pub use quantile::{linear_quantile, weighted_quantile};

use thiserror::Error;

/// Errors raised while configuring or running an aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// No group-key fields were given.
    #[error("Aggregation needs at least one group-key field")]
    EmptyGroupKeys,

    /// A quantile level is outside [0, 1] or finer than 0.001.
    #[error("Quantile level {q} is outside [0, 1] or finer than 0.001")]
    InvalidQuantile {
        /// The rejected level.
        q: f64,
    },

    /// A record value is NaN or infinite.
    #[error("Record {point_id} has a non-finite value")]
    NonFiniteValue {
        /// Point the record came from.
        point_id: String,
    },

    /// Partials of different granularities cannot be merged.
    #[error("Cannot merge partial aggregates over {left} and {right}")]
    MismatchedFields {
        /// Granularity of the receiving partial.
        left: String,
        /// Granularity of the merged partial.
        right: String,
    },
}

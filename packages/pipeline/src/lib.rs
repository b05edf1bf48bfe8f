#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Partitioned end-to-end coverage runs.
//!
//! Ties the stages together: point records are read from one or more
//! [`input::PointSource`]s, split into fixed-size partitions, validated and
//! attributed on a pool of worker threads against a shared
//! [`geo_coverage_spatial::GeometryIndex`], aggregated per granularity,
//! and finally evaluated for coverage and inequality. Every run produces a
//! [`geo_coverage_models::RunSummary`], including runs that abort.
//!
//! The [`output`] module persists each stage as CSV (and optionally
//! `DuckDB`) so later runs can re-evaluate without re-attribution.

pub mod input;
pub mod output;
pub mod progress;
pub mod run;

pub use input::{CsvPointFile, MemoryBatch, PointRow, PointSource, read_population};
pub use output::OutputDir;
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use run::{AttributionRun, Pipeline, RunReport};

use std::path::PathBuf;

use geo_coverage_aggregate::AggregateError;
use geo_coverage_models::ConfigError;
use geo_coverage_spatial::SpatialError;
use geo_coverage_validation::ValidationError;
use thiserror::Error;

/// Errors that abort a run or a persistence step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Polygon loading or index construction failed.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// Aggregation failed.
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Coverage or inequality evaluation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid run configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A CSV file could not be read or written.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// The file being processed.
        path: PathBuf,
        /// The underlying error.
        source: csv::Error,
    },

    /// A file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being processed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file parsed but its content is not what the stage expects.
    #[error("Invalid content in {path}: {message}")]
    Format {
        /// The offending file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// A `DuckDB` operation failed.
    #[cfg(feature = "duckdb")]
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
}

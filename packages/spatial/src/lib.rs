#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index and uncertainty-aware point attribution.
//!
//! Loads the polygon units of one geographic universe (census blocks or
//! tracts) from `GeoJSON` or `DuckDB`, builds an R-tree over their bounding
//! boxes, and attributes geolocated points to the units their error buffers
//! overlap. Each attribution carries a confidence from a threshold ladder
//! that compares the point's error radius against the unit's scale.

pub mod attribute;
pub mod confidence;
pub mod geometry;
pub mod index;
pub mod load;

pub use attribute::{AttributionOutcome, Attributor};
pub use confidence::ConfidenceScorer;
pub use index::{GeometryIndex, PolygonUnit};
pub use load::{GeoJsonFile, PolygonSource};

#[cfg(feature = "duckdb")]
pub use load::DuckDbTable;

use geo_coverage_models::ConfigError;
use thiserror::Error;

/// Errors raised while loading polygons or building the index.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// No polygon units were available to index.
    #[error("Polygon set is empty")]
    EmptyPolygonSet,

    /// Two polygon units share the same identifier.
    #[error("Duplicate polygon unit id: {unit_id}")]
    DuplicateUnit {
        /// The repeated identifier.
        unit_id: String,
    },

    /// The polygon source could not be read.
    #[error("Failed to read polygon source {path}: {source}")]
    Io {
        /// Path of the polygon source.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The polygon source is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The polygon source parsed but does not have the expected shape.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// The run configuration is not usable for attribution.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A `DuckDB` query failed.
    #[cfg(feature = "duckdb")]
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
}

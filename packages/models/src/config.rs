//! Run configuration.
//!
//! One [`RunConfig`] is built per run (defaults, optionally overlaid by a
//! TOML file and CLI flags) and handed to each component at construction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::{GroupField, QuantileValue};

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`RunConfig`].
    #[error("Invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A configuration value is out of its allowed range.
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },
}

/// How a point whose error buffer intersects several units is attributed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SelectionMode {
    /// One attribution per intersecting unit, each with its own confidence.
    #[default]
    FanOut,
    /// A single attribution to the unit with the largest overlap area.
    BestOverlap,
    /// A single attribution to the unit whose centroid is nearest the point.
    ///
    /// Approximate: near irregular boundaries this can pick a unit that
    /// overlaps the buffer less than a neighbour does.
    NearestCentroid,
}

/// Whether aggregate statistics are weighted by attribution confidence.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Weighting {
    /// Every record is weighted by its attribution confidence.
    #[default]
    Confidence,
    /// Every record has weight 1.
    Unweighted,
}

/// Threshold ladder mapping positional error against unit scale to a
/// confidence value. Tiers are checked top to bottom; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceLadder {
    /// Radii below this (meters) are treated as precise.
    pub precise_radius_m: f64,
    /// Absolute radius (meters) below which the second-lowest tier applies.
    pub absolute_radius_m: f64,
    /// Exact flag set, or radius below `precise_radius_m`.
    pub precise: f64,
    /// Radius below half the unit diameter.
    pub within_half_diameter: f64,
    /// Radius below the unit diameter.
    pub within_diameter: f64,
    /// Radius below twice the unit diameter.
    pub within_double_diameter: f64,
    /// Radius below `absolute_radius_m`.
    pub within_absolute_radius: f64,
    /// Everything else. Never zero, so weak evidence is kept at low weight.
    pub floor: f64,
}

impl Default for ConfidenceLadder {
    fn default() -> Self {
        Self {
            precise_radius_m: 50.0,
            absolute_radius_m: 1000.0,
            precise: 1.0,
            within_half_diameter: 0.8,
            within_diameter: 0.5,
            within_double_diameter: 0.3,
            within_absolute_radius: 0.15,
            floor: 0.05,
        }
    }
}

impl ConfidenceLadder {
    /// Tier values from the most to the least trusted.
    #[must_use]
    pub const fn tiers(&self) -> [f64; 6] {
        [
            self.precise,
            self.within_half_diameter,
            self.within_diameter,
            self.within_double_diameter,
            self.within_absolute_radius,
            self.floor,
        ]
    }

    /// Checks that every tier lies in (0, 1] and that tiers never increase.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tiers = self.tiers();
        if let Some(bad) = tiers.iter().find(|t| t.is_nan() || **t <= 0.0 || **t > 1.0) {
            return Err(ConfigError::Invalid {
                field: "confidence",
                message: format!("tier value {bad} is outside (0, 1]"),
            });
        }
        if tiers.windows(2).any(|w| w[1] > w[0]) {
            return Err(ConfigError::Invalid {
                field: "confidence",
                message: format!("tier values must not increase: {tiers:?}"),
            });
        }
        if self.precise_radius_m.is_nan() || self.precise_radius_m < 0.0 {
            return Err(ConfigError::Invalid {
                field: "confidence.precise_radius_m",
                message: format!("{} must be >= 0", self.precise_radius_m),
            });
        }
        if self.absolute_radius_m.is_nan() || self.absolute_radius_m <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "confidence.absolute_radius_m",
                message: format!("{} must be > 0", self.absolute_radius_m),
            });
        }
        Ok(())
    }
}

/// Configuration for one attribution + validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Units with weighted activity below this are masked.
    pub min_sample_threshold: u32,
    /// Quantile levels computed for every aggregate bucket.
    pub quantiles: Vec<f64>,
    /// Independent aggregation granularities.
    pub group_keys: Vec<Vec<GroupField>>,
    /// Meters per degree used to turn an error radius into a buffer radius.
    pub radius_to_degree_factor: f64,
    /// Vertex count of the circular error buffer.
    pub buffer_segments: usize,
    /// Attribution fan-out policy.
    pub selection: SelectionMode,
    /// Aggregate weighting policy.
    pub weighting: Weighting,
    /// Maximum points per worker partition.
    pub partition_size: usize,
    /// Worker threads; 0 uses the available parallelism.
    pub workers: usize,
    /// Confidence threshold ladder.
    pub confidence: ConfidenceLadder,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            min_sample_threshold: 20,
            quantiles: vec![0.10, 0.25, 0.50, 0.75, 0.90],
            group_keys: vec![
                vec![GroupField::Day, GroupField::UnitId],
                vec![GroupField::Year, GroupField::Month, GroupField::UnitId],
                vec![GroupField::Year, GroupField::UnitId],
            ],
            radius_to_degree_factor: 111_320.0,
            buffer_segments: 32,
            selection: SelectionMode::default(),
            weighting: Weighting::default(),
            partition_size: 50_000,
            workers: 0,
            confidence: ConfidenceLadder::default(),
        }
    }
}

impl RunConfig {
    /// Parses and validates a TOML configuration. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out of
    /// range.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(q) = self
            .quantiles
            .iter()
            .find(|q| !(0.0..=1.0).contains(*q))
        {
            return Err(ConfigError::Invalid {
                field: "quantiles",
                message: format!("{q} is outside [0, 1]"),
            });
        }
        let mut labels = std::collections::BTreeSet::new();
        for &q in &self.quantiles {
            if !QuantileValue::is_valid_level(q) {
                return Err(ConfigError::Invalid {
                    field: "quantiles",
                    message: format!("{q} is finer than 0.001"),
                });
            }
            if !labels.insert(QuantileValue::label(q)) {
                return Err(ConfigError::Invalid {
                    field: "quantiles",
                    message: format!("{q} is listed more than once"),
                });
            }
        }
        if self.group_keys.is_empty() || self.group_keys.iter().any(Vec::is_empty) {
            return Err(ConfigError::Invalid {
                field: "group_keys",
                message: "at least one non-empty group-key set is required".to_string(),
            });
        }
        if !(self.radius_to_degree_factor.is_finite() && self.radius_to_degree_factor > 0.0) {
            return Err(ConfigError::Invalid {
                field: "radius_to_degree_factor",
                message: format!("{} must be > 0", self.radius_to_degree_factor),
            });
        }
        if self.buffer_segments < 3 {
            return Err(ConfigError::Invalid {
                field: "buffer_segments",
                message: format!("{} must be >= 3", self.buffer_segments),
            });
        }
        if self.partition_size == 0 {
            return Err(ConfigError::Invalid {
                field: "partition_size",
                message: "must be > 0".to_string(),
            });
        }
        self.confidence.validate()
    }

    /// Worker count to use, resolving 0 to the available parallelism.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

//! Polygon sources.
//!
//! A [`PolygonSource`] resolves raw boundary files into [`PolygonUnit`]s.
//! Features that cannot be converted are skipped with a warning; the
//! resolved set must still be non-empty.

use std::path::{Path, PathBuf};

use geojson::{Feature, GeoJson, feature::Id};
use serde_json::Value;

use crate::SpatialError;
use crate::geometry::geometry_to_multipolygon;
use crate::index::PolygonUnit;

/// Identifier properties tried, in order, when none is configured.
pub const DEFAULT_ID_PROPERTIES: &[&str] = &["GEOID20", "geoid", "GEOID"];

/// Population properties tried, in order.
const POPULATION_PROPERTIES: &[&str] = &["population", "POP20", "pop"];

/// Precomputed diameter properties, in meters.
const DIAMETER_PROPERTIES: &[&str] = &["diameter_m", "block_diameter_m"];

/// Precomputed area properties, in square meters.
const AREA_PROPERTIES: &[&str] = &["area_m2", "block_area_m2"];

/// Anything that can supply the polygon units of one universe.
pub trait PolygonSource {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> String;

    /// Loads every unit.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the source cannot be read or yields no
    /// units.
    fn load(&self) -> Result<Vec<PolygonUnit>, SpatialError>;
}

/// A `GeoJSON` `FeatureCollection` file of polygon units.
#[derive(Debug, Clone)]
pub struct GeoJsonFile {
    path: PathBuf,
    id_property: Option<String>,
}

impl GeoJsonFile {
    /// Reads units from `path`, taking ids from the first of
    /// [`DEFAULT_ID_PROPERTIES`] present on each feature.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_property: None,
        }
    }

    /// Takes unit ids from `property` instead of the defaults.
    #[must_use]
    pub fn with_id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = Some(property.into());
        self
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses a `FeatureCollection` (or a single `Feature`) into units.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::GeoJson`] for malformed `GeoJSON`,
    /// [`SpatialError::Conversion`] for a bare geometry, and
    /// [`SpatialError::EmptyPolygonSet`] when no feature converts.
    pub fn parse(&self, contents: &str) -> Result<Vec<PolygonUnit>, SpatialError> {
        let features = match contents.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(SpatialError::Conversion {
                    message: format!(
                        "{} holds a bare geometry; expected a FeatureCollection",
                        self.name()
                    ),
                });
            }
        };

        let total = features.len();
        let units: Vec<PolygonUnit> = features
            .into_iter()
            .enumerate()
            .filter_map(|(i, feature)| self.convert(i, feature))
            .collect();

        if units.is_empty() {
            return Err(SpatialError::EmptyPolygonSet);
        }
        if units.len() < total {
            log::warn!(
                "Skipped {} of {total} features in {}",
                total - units.len(),
                self.name()
            );
        }
        log::info!("Loaded {} polygon units from {}", units.len(), self.name());

        Ok(units)
    }

    fn convert(&self, position: usize, feature: Feature) -> Option<PolygonUnit> {
        let props = feature.properties.as_ref();
        let prop = |key: &str| props.and_then(|p| p.get(key));

        let id = match &self.id_property {
            Some(key) => prop(key.as_str()).and_then(value_to_id),
            None => DEFAULT_ID_PROPERTIES
                .iter()
                .find_map(|key| prop(key).and_then(value_to_id)),
        }
        .or_else(|| {
            feature.id.as_ref().map(|id| match id {
                Id::String(s) => s.clone(),
                Id::Number(n) => n.to_string(),
            })
        });
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            log::warn!("Feature #{position} in {} has no unit id", self.name());
            return None;
        };

        let population = POPULATION_PROPERTIES
            .iter()
            .find_map(|key| prop(key).and_then(value_to_i64));
        let diameter_m = DIAMETER_PROPERTIES
            .iter()
            .find_map(|key| prop(key).and_then(value_to_f64));
        let area_m2 = AREA_PROPERTIES
            .iter()
            .find_map(|key| prop(key).and_then(value_to_f64));

        let Some(boundary) = feature.geometry.and_then(geometry_to_multipolygon) else {
            log::warn!("Feature {id} in {} has no areal geometry", self.name());
            return None;
        };

        Some(PolygonUnit::new(id, population, boundary, area_m2, diameter_m))
    }
}

impl PolygonSource for GeoJsonFile {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<PolygonUnit>, SpatialError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| SpatialError::Io {
            path: self.name(),
            source,
        })?;
        self.parse(&contents)
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Square meters per square mile.
#[cfg(feature = "duckdb")]
const SQ_M_PER_SQ_MI: f64 = 2_589_988.110_336;

/// A boundaries table in a `DuckDB` file, with `GeoJSON` stored as text.
///
/// The query must return `(id TEXT, population INTEGER, land_area_sq_mi
/// DOUBLE, geojson TEXT)`; the default reads the `census_tracts` layout.
#[cfg(feature = "duckdb")]
#[derive(Debug, Clone)]
pub struct DuckDbTable {
    path: PathBuf,
    query: String,
}

#[cfg(feature = "duckdb")]
impl DuckDbTable {
    /// Reads `table` from the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, table: &str) -> Self {
        Self {
            path: path.into(),
            query: format!(
                "SELECT geoid, population, land_area_sq_mi, boundary_geojson as geojson \
                 FROM {table} WHERE boundary_geojson IS NOT NULL"
            ),
        }
    }

    /// Replaces the boundary query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

#[cfg(feature = "duckdb")]
impl PolygonSource for DuckDbTable {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<PolygonUnit>, SpatialError> {
        use crate::geometry::parse_geojson_to_multipolygon;

        let conn = duckdb::Connection::open(&self.path)?;
        let mut stmt = conn.prepare(&self.query)?;
        let mut rows = stmt.query([])?;
        let mut units = Vec::new();

        while let Some(row) = rows.next()? {
            let geoid: String = row.get(0)?;
            let population: Option<i64> = row.get(1)?;
            let area_sq_mi: Option<f64> = row.get(2)?;
            let geojson_str: String = row.get(3)?;

            if geoid.is_empty() || geojson_str.is_empty() {
                continue;
            }

            let Some(boundary) = parse_geojson_to_multipolygon(&geojson_str) else {
                log::warn!("Failed to parse GeoJSON for boundary {geoid}");
                continue;
            };

            let area_m2 = area_sq_mi.map(|a| a * SQ_M_PER_SQ_MI);
            units.push(PolygonUnit::new(geoid, population, boundary, area_m2, None));
        }

        if units.is_empty() {
            return Err(SpatialError::EmptyPolygonSet);
        }
        log::info!("Loaded {} polygon units from {}", units.len(), self.name());

        Ok(units)
    }
}

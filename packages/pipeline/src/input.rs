//! Point and population inputs.
//!
//! Points arrive as CSV files or in-memory batches. A row that cannot be
//! turned into a [`PointRecord`] is kept as a [`PointRejection`] so it is
//! counted with the other validation drops instead of failing the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo_coverage_models::point::{parse_flag, parse_timestamp};
use geo_coverage_models::{PointRecord, PointRejection};
use serde::Deserialize;

use crate::PipelineError;

/// A raw input row: either a record ready for validation or the reason it
/// could not be read.
pub type PointRow = Result<PointRecord, PointRejection>;

/// A named collection of point records.
///
/// Each source is split into partitions by the run; a source that fails
/// to read is recorded as a failed partition and the run continues.
pub trait PointSource: Send + Sync {
    /// Human-readable name used in logs and the run summary.
    fn name(&self) -> String;

    /// Reads every row of the source.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the source as a whole cannot be read.
    fn read(&self) -> Result<Vec<PointRow>, PipelineError>;
}

/// Points held in memory, e.g. produced by another program or a test.
#[derive(Debug, Clone)]
pub struct MemoryBatch {
    name: String,
    records: Vec<PointRecord>,
}

impl MemoryBatch {
    /// Wraps `records` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, records: Vec<PointRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl PointSource for MemoryBatch {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read(&self) -> Result<Vec<PointRow>, PipelineError> {
        Ok(self.records.iter().cloned().map(Ok).collect())
    }
}

/// A CSV file of point records.
///
/// Columns are matched by header name: `id` (or `message_id`),
/// `latitude`, `longitude`, `value` (or `score`), `timestamp` (or `date`),
/// and optionally `error_radius_m` (or `spatialerror`), `is_exact` (or
/// `GPS`) and `user_id`. Other columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvPointFile {
    path: PathBuf,
}

impl CsvPointFile {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PointSource for CsvPointFile {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Vec<PointRow>, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| PipelineError::Csv {
                path: self.path.clone(),
                source: e,
            })?;

        let rows: Vec<PointRow> = reader
            .deserialize::<CsvPointRow>()
            .map(|row| match row {
                Ok(row) => row.into_record(),
                Err(e) => {
                    log::debug!("Unreadable row in {}: {e}", self.path.display());
                    Err(PointRejection::MalformedField)
                }
            })
            .collect();

        log::info!("Read {} point rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

/// One CSV row as text; parsing happens in [`CsvPointRow::into_record`] so
/// a bad field becomes a rejection rather than a reader error.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvPointRow {
    #[serde(alias = "message_id")]
    id: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    #[serde(alias = "spatialerror")]
    error_radius_m: Option<String>,
    #[serde(alias = "GPS")]
    is_exact: Option<String>,
    #[serde(alias = "score")]
    value: Option<String>,
    #[serde(alias = "date")]
    timestamp: Option<String>,
    user_id: Option<String>,
}

impl CsvPointRow {
    fn into_record(self) -> PointRow {
        let timestamp = match non_empty(self.timestamp.as_deref()) {
            Some(s) => Some(parse_timestamp(s).ok_or(PointRejection::MalformedField)?),
            None => None,
        };

        Ok(PointRecord {
            id: self.id.unwrap_or_default().trim().to_string(),
            latitude: parse_number(self.latitude.as_deref())?,
            longitude: parse_number(self.longitude.as_deref())?,
            error_radius_m: parse_number(self.error_radius_m.as_deref())?,
            is_exact: self.is_exact.as_deref().is_some_and(parse_flag),
            value: parse_number(self.value.as_deref())?,
            timestamp,
            user_id: non_empty(self.user_id.as_deref()).map(str::to_string),
        })
    }
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}

/// An empty field is absent; a non-empty field that is not a number is
/// malformed.
fn parse_number(field: Option<&str>) -> Result<Option<f64>, PointRejection> {
    non_empty(field)
        .map(|s| s.parse::<f64>().map_err(|_| PointRejection::MalformedField))
        .transpose()
}

#[derive(Debug, Deserialize)]
struct PopulationRow {
    #[serde(alias = "GEOID20", alias = "geoid")]
    unit_id: String,
    #[serde(alias = "P_i", alias = "pop")]
    population: String,
}

/// Reads a `unit_id,population` table.
///
/// Populations must be whole numbers (`1200` or `1200.0`). Unlike point
/// rows, a bad population row fails the whole read.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if the file cannot be read and
/// [`PipelineError::Format`] for a non-integral population or a duplicate
/// unit id.
pub fn read_population(path: &Path) -> Result<BTreeMap<String, i64>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| PipelineError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut population = BTreeMap::new();
    for row in reader.deserialize::<PopulationRow>() {
        let row = row.map_err(|e| PipelineError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let unit_id = row.unit_id.trim().to_string();
        let value = parse_population(&row.population).ok_or_else(|| PipelineError::Format {
            path: path.to_path_buf(),
            message: format!("population {:?} of unit {unit_id} is not a whole number", row.population),
        })?;
        if population.insert(unit_id.clone(), value).is_some() {
            return Err(PipelineError::Format {
                path: path.to_path_buf(),
                message: format!("unit {unit_id} appears more than once"),
            });
        }
    }

    log::info!("Read population of {} units from {}", population.len(), path.display());
    Ok(population)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn parse_population(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(value) = s.parse::<i64>() {
        return Some(value);
    }
    let value = s.parse::<f64>().ok()?;
    let whole = value as i64;
    (value.is_finite() && value.fract() == 0.0 && whole as f64 == value).then_some(whole)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_canonical_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "points.csv",
            "id,latitude,longitude,error_radius_m,is_exact,value,timestamp,user_id\n\
             a,39.1,-75.5,120,false,0.4,2020-03-01 12:00:00,u1\n\
             b,39.2,-75.6,,true,-0.2,2020-03-02T08:30:00Z,\n",
        );
        let rows = CsvPointFile::new(&path).read().unwrap();
        assert_eq!(rows.len(), 2);

        let a = rows[0].as_ref().unwrap();
        assert_eq!(a.id, "a");
        assert_eq!(a.error_radius_m, Some(120.0));
        assert!(!a.is_exact);
        assert_eq!(a.user_id.as_deref(), Some("u1"));

        let b = rows[1].as_ref().unwrap();
        assert_eq!(b.error_radius_m, None);
        assert!(b.is_exact);
        assert_eq!(b.user_id, None);
        assert!(b.timestamp.is_some());
    }

    #[test]
    fn accepts_legacy_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "legacy.csv",
            "message_id,latitude,longitude,spatialerror,GPS,score,date,extra\n\
             m1,40.0,-74.0,35.5,True,0.9,2019-12-31,ignored\n",
        );
        let rows = CsvPointFile::new(&path).read().unwrap();
        let record = rows[0].as_ref().unwrap();
        assert_eq!(record.id, "m1");
        assert_eq!(record.error_radius_m, Some(35.5));
        assert!(record.is_exact);
        assert_eq!(record.value, Some(0.9));
        assert!(record.clone().validate().is_ok());
    }

    #[test]
    fn malformed_fields_become_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "bad.csv",
            "id,latitude,longitude,value,timestamp\n\
             a,north,-75.5,0.1,2020-01-01\n\
             b,39.0,-75.5,0.1,yesterday\n\
             c,,-75.5,0.1,2020-01-01\n",
        );
        let rows = CsvPointFile::new(&path).read().unwrap();
        assert_eq!(rows[0], Err(PointRejection::MalformedField));
        assert_eq!(rows[1], Err(PointRejection::MalformedField));
        let c = rows[2].clone().unwrap();
        assert_eq!(c.latitude, None);
        assert_eq!(c.validate().unwrap_err(), PointRejection::MissingCoordinates);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvPointFile::new(dir.path().join("absent.csv")).read().unwrap_err();
        assert!(matches!(err, PipelineError::Csv { .. }));
    }

    #[test]
    fn memory_batch_yields_its_records() {
        let record = PointRecord {
            id: "x".to_string(),
            latitude: Some(1.0),
            longitude: Some(2.0),
            error_radius_m: None,
            is_exact: true,
            value: Some(0.0),
            timestamp: parse_timestamp("2021-01-01"),
            user_id: None,
        };
        let batch = MemoryBatch::new("batch", vec![record.clone()]);
        assert_eq!(batch.name(), "batch");
        assert_eq!(batch.read().unwrap(), vec![Ok(record)]);
    }

    #[test]
    fn reads_population_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "pop.csv", "GEOID20,P_i\n100,1200\n200,35.0\n300,0\n");
        let population = read_population(&path).unwrap();
        assert_eq!(population.len(), 3);
        assert_eq!(population["100"], 1200);
        assert_eq!(population["200"], 35);
        assert_eq!(population["300"], 0);
    }

    #[test]
    fn fractional_or_duplicate_population_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fractional = write_file(&dir, "frac.csv", "unit_id,population\na,12.5\n");
        assert!(matches!(
            read_population(&fractional),
            Err(PipelineError::Format { .. })
        ));

        let duplicate = write_file(&dir, "dup.csv", "unit_id,population\na,1\na,2\n");
        assert!(matches!(
            read_population(&duplicate),
            Err(PipelineError::Format { .. })
        ));
    }
}

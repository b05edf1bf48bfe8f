//! Persistence of run outputs.
//!
//! Every stage has a CSV table: `attributions.csv`, one
//! `aggregate_<fields>.csv` per granularity, `coverage.csv` and
//! `lorenz.csv`. The run summary and validation figures are JSON, written
//! to a `.tmp` file and renamed into place so a reader never sees a
//! partial file. Aggregate and coverage tables can be read back.

use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use geo_coverage_models::{
    AggregateBucket, AggregateTable, Attribution, CoverageRecord, GroupField, LorenzCurve,
    QuantileValue, RunSummary,
};
use serde::Serialize;

use crate::PipelineError;
use crate::run::RunReport;

/// Statistic columns of an aggregate table, between the key columns and
/// the quantile columns.
const AGGREGATE_STAT_COLUMNS: [&str; 7] = [
    "record_count",
    "user_count",
    "weighted_count",
    "weighted_mean",
    "weighted_std",
    "min",
    "max",
];

/// A directory receiving the tables of one run.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Opens `root`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| PipelineError::Io {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the aggregate table of a granularity named `name`.
    #[must_use]
    pub fn aggregate_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("aggregate_{name}.csv"))
    }

    /// Writes `attributions.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be written.
    pub fn write_attributions(&self, attributions: &[Attribution]) -> Result<PathBuf, PipelineError> {
        let path = self.root.join("attributions.csv");
        write_rows(&path, attributions)?;
        Ok(path)
    }

    /// Writes one `aggregate_<fields>.csv` per table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a file cannot be written.
    pub fn write_aggregates(&self, tables: &[AggregateTable]) -> Result<Vec<PathBuf>, PipelineError> {
        tables
            .iter()
            .map(|table| {
                let path = self.aggregate_path(&table.name());
                write_aggregate(&path, table)?;
                Ok(path)
            })
            .collect()
    }

    /// Writes `summary.json`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be written.
    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf, PipelineError> {
        let path = self.root.join("summary.json");
        write_json_atomic(&path, summary)?;
        Ok(path)
    }

    /// Writes whichever of `coverage.csv`, `lorenz.csv` and
    /// `validation.json` the report carries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a file cannot be written.
    pub fn write_validation(&self, report: &RunReport) -> Result<Vec<PathBuf>, PipelineError> {
        let mut written = Vec::new();
        if let Some(coverage) = &report.coverage {
            let path = self.root.join("coverage.csv");
            write_rows(&path, &coverage.records)?;
            written.push(path);
        }
        if let Some(lorenz) = &report.lorenz {
            let path = self.root.join("lorenz.csv");
            write_lorenz(&path, lorenz)?;
            written.push(path);
        }
        if let Some(validation) = &report.validation {
            let path = self.root.join("validation.json");
            write_json_atomic(&path, validation)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Writes every table of a full run, then the summary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a file cannot be written.
    pub fn write_report(&self, report: &RunReport) -> Result<Vec<PathBuf>, PipelineError> {
        let mut written = vec![self.write_attributions(&report.attributions)?];
        written.extend(self.write_aggregates(&report.aggregates)?);
        written.extend(self.write_validation(report)?);
        written.push(self.write_summary(&report.summary)?);
        log::info!("Wrote {} files to {}", written.len(), self.root.display());
        Ok(written)
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> PipelineError + '_ {
    move |e| PipelineError::Csv {
        path: path.to_path_buf(),
        source: e,
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    for row in rows {
        writer.serialize(row).map_err(csv_error(path))?;
    }
    writer.flush().map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes a Lorenz curve, origin first.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_lorenz(path: &Path, curve: &LorenzCurve) -> Result<(), PipelineError> {
    write_rows(path, &curve.points)
}

/// Reads a coverage table written by [`OutputDir::write_validation`].
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if the file cannot be read or a row does
/// not match the coverage schema.
pub fn read_coverage(path: &Path) -> Result<Vec<CoverageRecord>, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let records = reader
        .deserialize::<CoverageRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error(path))?;
    log::info!("Read {} coverage records from {}", records.len(), path.display());
    Ok(records)
}

/// Serializes `value` as pretty JSON to `path` via a temporary file.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or a file operation fails.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, contents).map_err(|e| PipelineError::Io {
        path: tmp_path.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::info!("Saved {}", path.display());
    Ok(())
}

/// Writes an aggregate table: key columns named after the group fields,
/// the statistic columns, then one `qNN` column per quantile level.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_aggregate(path: &Path, table: &AggregateTable) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;

    let header: Vec<String> = table
        .fields
        .iter()
        .map(ToString::to_string)
        .chain(AGGREGATE_STAT_COLUMNS.iter().map(|c| (*c).to_string()))
        .chain(table.quantiles.iter().map(|&q| QuantileValue::label(q)))
        .collect();
    writer.write_record(&header).map_err(csv_error(path))?;

    for bucket in &table.buckets {
        let row: Vec<String> = bucket
            .key
            .iter()
            .cloned()
            .chain([
                bucket.record_count.to_string(),
                bucket.user_count.to_string(),
                bucket.weighted_count.to_string(),
                bucket.weighted_mean.to_string(),
                bucket.weighted_std.map(|s| s.to_string()).unwrap_or_default(),
                bucket.min.to_string(),
                bucket.max.to_string(),
            ])
            .chain(
                table
                    .quantiles
                    .iter()
                    .map(|&q| bucket.quantile(q).map(|v| v.to_string()).unwrap_or_default()),
            )
            .collect();
        writer.write_record(&row).map_err(csv_error(path))?;
    }

    writer.flush().map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::debug!("Wrote {} buckets to {}", table.buckets.len(), path.display());
    Ok(())
}

/// Reads an aggregate table written by [`write_aggregate`].
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if the file cannot be read and
/// [`PipelineError::Format`] if its header or a value does not match the
/// aggregate layout.
pub fn read_aggregate(path: &Path) -> Result<AggregateTable, PipelineError> {
    let format_error = |message: String| PipelineError::Format {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let header = reader.headers().map_err(csv_error(path))?.clone();

    let key_len = header
        .iter()
        .position(|h| h == AGGREGATE_STAT_COLUMNS[0])
        .ok_or_else(|| format_error("missing record_count column".to_string()))?;
    let fields = header
        .iter()
        .take(key_len)
        .map(|h| {
            GroupField::from_str(h).map_err(|_| format_error(format!("unknown group field {h:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stats_end = key_len + AGGREGATE_STAT_COLUMNS.len();
    let stats: Vec<&str> = header.iter().skip(key_len).take(AGGREGATE_STAT_COLUMNS.len()).collect();
    if stats != AGGREGATE_STAT_COLUMNS {
        return Err(format_error(format!("unexpected statistic columns {stats:?}")));
    }
    let quantiles = header
        .iter()
        .skip(stats_end)
        .map(|h| {
            QuantileValue::parse_label(h)
                .ok_or_else(|| format_error(format!("unknown quantile column {h:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut buckets = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();
        let number = |i: usize| -> Result<f64, PipelineError> {
            cell(i)
                .parse::<f64>()
                .map_err(|_| format_error(format!("bad number {:?} in column {}", cell(i), &header[i])))
        };
        let count = |i: usize| -> Result<u64, PipelineError> {
            cell(i)
                .parse::<u64>()
                .map_err(|_| format_error(format!("bad count {:?} in column {}", cell(i), &header[i])))
        };
        let optional = |i: usize| -> Result<Option<f64>, PipelineError> {
            if cell(i).is_empty() { Ok(None) } else { number(i).map(Some) }
        };

        let mut bucket_quantiles = Vec::with_capacity(quantiles.len());
        for (offset, &q) in quantiles.iter().enumerate() {
            if let Some(value) = optional(stats_end + offset)? {
                bucket_quantiles.push(QuantileValue { q, value });
            }
        }

        buckets.push(AggregateBucket {
            key: (0..key_len).map(|i| cell(i).to_string()).collect(),
            record_count: count(key_len)?,
            user_count: count(key_len + 1)?,
            weighted_count: number(key_len + 2)?,
            weighted_mean: number(key_len + 3)?,
            weighted_std: optional(key_len + 4)?,
            min: number(key_len + 5)?,
            max: number(key_len + 6)?,
            quantiles: bucket_quantiles,
        });
    }

    log::info!("Read {} buckets from {}", buckets.len(), path.display());
    Ok(AggregateTable {
        fields,
        quantiles,
        buckets,
    })
}

/// Writes the tables of a run into a `DuckDB` database, replacing tables
/// of the same name.
///
/// # Errors
///
/// Returns [`PipelineError::Database`] if a statement fails.
#[cfg(feature = "duckdb")]
pub fn write_duckdb(path: &Path, report: &RunReport) -> Result<(), PipelineError> {
    use duckdb::types::Value;

    let duck = duckdb::Connection::open(path)?;
    duck.execute_batch(
        "CREATE OR REPLACE TABLE attributions (
            point_id VARCHAR NOT NULL,
            unit_id VARCHAR NOT NULL,
            confidence DOUBLE NOT NULL
        );
        CREATE OR REPLACE TABLE coverage (
            unit_id VARCHAR PRIMARY KEY,
            activity DOUBLE NOT NULL,
            population BIGINT NOT NULL,
            coverage_ratio DOUBLE NOT NULL,
            log2_coverage_ratio DOUBLE,
            masked BOOLEAN NOT NULL
        );
        CREATE OR REPLACE TABLE lorenz (
            rank INTEGER NOT NULL,
            cum_population_share DOUBLE NOT NULL,
            cum_activity_share DOUBLE NOT NULL
        );",
    )?;

    duck.execute_batch("BEGIN TRANSACTION")?;
    {
        let mut stmt =
            duck.prepare("INSERT INTO attributions (point_id, unit_id, confidence) VALUES (?, ?, ?)")?;
        for a in &report.attributions {
            stmt.execute(duckdb::params![a.point_id, a.unit_id, a.confidence.get()])?;
        }
    }
    if let Some(coverage) = &report.coverage {
        let mut stmt = duck.prepare(
            "INSERT INTO coverage (unit_id, activity, population, coverage_ratio, log2_coverage_ratio, masked)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for r in &coverage.records {
            stmt.execute(duckdb::params![
                r.unit_id,
                r.activity,
                r.population,
                r.coverage_ratio,
                r.log2_coverage_ratio,
                r.masked,
            ])?;
        }
    }
    if let Some(lorenz) = &report.lorenz {
        let mut stmt = duck.prepare(
            "INSERT INTO lorenz (rank, cum_population_share, cum_activity_share) VALUES (?, ?, ?)",
        )?;
        for (rank, p) in lorenz.points.iter().enumerate() {
            let rank = i64::try_from(rank).unwrap_or(i64::MAX);
            stmt.execute(duckdb::params![rank, p.cum_population_share, p.cum_activity_share])?;
        }
    }

    for table in &report.aggregates {
        let name = format!("aggregate_{}", table.name().replace('-', "_"));
        let columns: Vec<String> = table
            .fields
            .iter()
            .map(|f| format!("\"{f}\" VARCHAR NOT NULL"))
            .chain(AGGREGATE_STAT_COLUMNS.iter().map(|c| {
                let ty = match *c {
                    "record_count" | "user_count" => "UBIGINT NOT NULL",
                    "weighted_std" => "DOUBLE",
                    _ => "DOUBLE NOT NULL",
                };
                format!("\"{c}\" {ty}")
            }))
            .chain(
                table
                    .quantiles
                    .iter()
                    .map(|&q| format!("\"{}\" DOUBLE", QuantileValue::label(q))),
            )
            .collect();
        duck.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {name} ({})",
            columns.join(", ")
        ))?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut stmt = duck.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
        for bucket in &table.buckets {
            let row: Vec<Value> = bucket
                .key
                .iter()
                .map(|k| Value::Text(k.clone()))
                .chain([
                    Value::UBigInt(bucket.record_count),
                    Value::UBigInt(bucket.user_count),
                    Value::Double(bucket.weighted_count),
                    Value::Double(bucket.weighted_mean),
                    bucket.weighted_std.map_or(Value::Null, Value::Double),
                    Value::Double(bucket.min),
                    Value::Double(bucket.max),
                ])
                .chain(
                    table
                        .quantiles
                        .iter()
                        .map(|&q| bucket.quantile(q).map_or(Value::Null, Value::Double)),
                )
                .collect();
            stmt.execute(duckdb::params_from_iter(row))?;
        }
    }
    duck.execute_batch("COMMIT")?;

    log::info!("Wrote run tables to {}", path.display());
    Ok(())
}

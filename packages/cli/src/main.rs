#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for point-to-polygon coverage runs.
//!
//! Uses `indicatif-log-bridge` (via [`geo_coverage_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.
//!
//! Every command writes `summary.json` into its output directory, also
//! when it fails.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use geo_coverage_cli_utils::{IndicatifProgress, MultiProgress};
use geo_coverage_models::{RunConfig, RunSummary, SelectionMode, Weighting};
use geo_coverage_pipeline::output::read_coverage;
use geo_coverage_pipeline::{
    CsvPointFile, OutputDir, Pipeline, PointSource, RunReport, read_population,
};
use geo_coverage_spatial::{GeoJsonFile, GeometryIndex, PolygonSource, PolygonUnit};

#[derive(Parser)]
#[command(
    name = "geo_coverage",
    about = "Point-to-polygon attribution and coverage validation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attribute points, aggregate them, and evaluate coverage and inequality
    Run {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        overrides: Overrides,
        /// `unit_id,population` CSV overriding polygon populations
        #[arg(long)]
        population: Option<PathBuf>,
        /// Also write every table into this `DuckDB` file (requires the
        /// `duckdb` feature)
        #[arg(long)]
        duckdb: Option<PathBuf>,
    },
    /// Attribute points only and write `attributions.csv`
    Attribute {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Re-evaluate a coverage table from a previous run with a new threshold
    Remask {
        /// `coverage.csv` written by a previous run
        #[arg(long)]
        coverage: PathBuf,
        /// Output directory
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Where points and polygons come from and where outputs go.
#[derive(Args)]
struct Inputs {
    /// Polygon GeoJSON file, or a `DuckDB` file with `--polygon-table`
    #[arg(long)]
    polygons: PathBuf,
    /// Read polygons from this `DuckDB` table (e.g., `census_tracts`)
    #[arg(long)]
    polygon_table: Option<String>,
    /// Feature property holding the unit id (default: `GEOID20`, then `geoid`)
    #[arg(long)]
    id_property: Option<String>,
    /// Point CSV files; each is split into partitions
    #[arg(long = "points", required = true, num_args = 1..)]
    points: Vec<PathBuf>,
    /// Output directory
    #[arg(long)]
    out: PathBuf,
}

/// Configuration file and per-field overrides.
#[derive(Args)]
struct Overrides {
    /// TOML run configuration; unset fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Minimum weighted activity for a unit to be reportable
    #[arg(long)]
    threshold: Option<u32>,
    /// Attribution policy (`fan_out`, `best_overlap`, `nearest_centroid`)
    #[arg(long)]
    selection: Option<SelectionMode>,
    /// Aggregate weighting (`confidence`, `unweighted`)
    #[arg(long)]
    weighting: Option<Weighting>,
    /// Worker threads (0 = available parallelism)
    #[arg(long)]
    workers: Option<usize>,
    /// Points per partition
    #[arg(long)]
    partition_size: Option<usize>,
}

impl Overrides {
    fn load(&self) -> Result<RunConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.min_sample_threshold = threshold;
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        if let Some(weighting) = self.weighting {
            config.weighting = weighting;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(partition_size) = self.partition_size {
            config.partition_size = partition_size;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let multi = geo_coverage_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            inputs,
            overrides,
            population,
            duckdb,
        } => run(&multi, &inputs, &overrides, population.as_deref(), duckdb.as_deref()),
        Commands::Attribute { inputs, overrides } => attribute(&multi, &inputs, &overrides),
        Commands::Remask {
            coverage,
            out,
            overrides,
        } => remask(&coverage, &out, &overrides),
    }
}

fn run(
    multi: &MultiProgress,
    inputs: &Inputs,
    overrides: &Overrides,
    population: Option<&Path>,
    duckdb: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let out = OutputDir::create(&inputs.out)?;

    let prepared = prepare(multi, inputs, overrides).and_then(|(pipeline, index)| {
        let population = population.map(read_population).transpose()?;
        Ok((pipeline, index, population))
    });
    let (pipeline, index, population) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => return abort(&out, e),
    };

    let sources = point_sources(&inputs.points);
    let mut report = pipeline.run(&index, &source_refs(&sources), population.as_ref());

    out.write_report(&report)?;
    if let Some(path) = duckdb {
        write_duckdb(path, &report)?;
    }
    print_summary(&report.summary);
    finish(&mut report)
}

fn attribute(
    multi: &MultiProgress,
    inputs: &Inputs,
    overrides: &Overrides,
) -> Result<(), Box<dyn Error>> {
    let out = OutputDir::create(&inputs.out)?;

    let (pipeline, index) = match prepare(multi, inputs, overrides) {
        Ok(prepared) => prepared,
        Err(e) => return abort(&out, e),
    };

    let sources = point_sources(&inputs.points);
    let attributed = match pipeline.attribute(&index, &source_refs(&sources)) {
        Ok(attributed) => attributed,
        Err(e) => return abort(&out, e.into()),
    };

    out.write_attributions(&attributed.attributions)?;
    out.write_summary(&attributed.summary)?;
    print_summary(&attributed.summary);
    Ok(())
}

fn remask(coverage: &Path, out: &Path, overrides: &Overrides) -> Result<(), Box<dyn Error>> {
    let out = OutputDir::create(out)?;

    let prepared = overrides.load().and_then(|config| {
        let pipeline = Pipeline::new(config)?;
        let records = read_coverage(coverage)?;
        Ok((pipeline, records))
    });
    let (pipeline, records) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => return abort(&out, e),
    };

    let mut report = pipeline.remask(&records);
    out.write_validation(&report)?;
    out.write_summary(&report.summary)?;
    print_summary(&report.summary);
    finish(&mut report)
}

/// Loads configuration and polygons and builds the pipeline.
fn prepare(
    multi: &MultiProgress,
    inputs: &Inputs,
    overrides: &Overrides,
) -> Result<(Pipeline, GeometryIndex), Box<dyn Error>> {
    let config = overrides.load()?;
    let index = GeometryIndex::build(load_polygons(inputs)?)?;
    let pipeline = Pipeline::new(config)?
        .with_progress(IndicatifProgress::batch_bar(multi, "Attributing partitions"));
    Ok((pipeline, index))
}

fn load_polygons(inputs: &Inputs) -> Result<Vec<PolygonUnit>, Box<dyn Error>> {
    if let Some(table) = &inputs.polygon_table {
        return load_duckdb_polygons(&inputs.polygons, table);
    }
    let mut source = GeoJsonFile::new(&inputs.polygons);
    if let Some(property) = &inputs.id_property {
        source = source.with_id_property(property.clone());
    }
    log::info!("Loading polygons from {}", source.name());
    Ok(source.load()?)
}

#[cfg(feature = "duckdb")]
fn load_duckdb_polygons(path: &Path, table: &str) -> Result<Vec<PolygonUnit>, Box<dyn Error>> {
    let source = geo_coverage_spatial::DuckDbTable::new(path, table);
    log::info!("Loading polygons from {}", source.name());
    Ok(source.load()?)
}

#[cfg(not(feature = "duckdb"))]
fn load_duckdb_polygons(_path: &Path, _table: &str) -> Result<Vec<PolygonUnit>, Box<dyn Error>> {
    Err("--polygon-table requires a build with the `duckdb` feature".into())
}

#[cfg(feature = "duckdb")]
fn write_duckdb(path: &Path, report: &RunReport) -> Result<(), Box<dyn Error>> {
    Ok(geo_coverage_pipeline::output::write_duckdb(path, report)?)
}

#[cfg(not(feature = "duckdb"))]
fn write_duckdb(_path: &Path, _report: &RunReport) -> Result<(), Box<dyn Error>> {
    Err("--duckdb requires a build with the `duckdb` feature".into())
}

fn point_sources(paths: &[PathBuf]) -> Vec<CsvPointFile> {
    paths.iter().map(CsvPointFile::new).collect()
}

fn source_refs(sources: &[CsvPointFile]) -> Vec<&dyn PointSource> {
    sources.iter().map(|s| s as &dyn PointSource).collect()
}

/// Records `error` in `summary.json` and returns it.
fn abort(out: &OutputDir, error: Box<dyn Error>) -> Result<(), Box<dyn Error>> {
    log::error!("{error}");
    let summary = RunSummary {
        error: Some(error.to_string()),
        ..RunSummary::default()
    };
    out.write_summary(&summary)?;
    Err(error)
}

fn finish(report: &mut RunReport) -> Result<(), Box<dyn Error>> {
    match report.error.take() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{:<22} {}", "input", summary.input);
    println!("{:<22} {}", "dropped", summary.dropped);
    for (reason, count) in &summary.dropped_by_reason {
        println!("  {reason:<20} {count}");
    }
    if summary.duplicate_ids > 0 {
        println!("{:<22} {}", "duplicate ids", summary.duplicate_ids);
    }
    println!("{:<22} {}", "unattributed", summary.unattributed);
    println!("{:<22} {}", "attributed points", summary.attributed_points);
    println!("{:<22} {}", "attributions", summary.attributions);
    println!(
        "{:<22} {}/{}",
        "failed partitions", summary.partitions_failed, summary.partitions_total
    );
    if summary.failed_rows > 0 {
        println!("{:<22} {}", "rows in failed parts", summary.failed_rows);
    }
    println!("{:<22} {}", "reportable units", summary.reportable_units);
    println!("{:<22} {}", "masked units", summary.masked_units);
    println!("{:<22} {}", "excluded units", summary.excluded_units);
    if let Some(gini) = summary.gini {
        println!("{:<22} {gini:.4}", "gini");
    }
}

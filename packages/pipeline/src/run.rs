//! Partitioned parallel run.
//!
//! Point rows are split into partitions of `partition_size` rows and
//! handed to a fixed pool of scoped worker threads. Each worker validates,
//! attributes and pre-aggregates its partition independently against the
//! shared read-only [`GeometryIndex`]; partial results are merged in
//! partition order, so the output does not depend on the worker count or
//! scheduling. A partition that fails (including a panic) is recorded in
//! the [`RunSummary`] and skipped.

use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use geo_coverage_aggregate::{AggregateError, Aggregator, PartialAggregate, activity_by_unit};
use geo_coverage_models::{
    AggregateTable, Attribution, CoverageRecord, LorenzCurve, RunConfig, RunSummary,
    ValidationSummary, Weighting,
};
use geo_coverage_spatial::{AttributionOutcome, Attributor, GeometryIndex};
use geo_coverage_validation::{CoverageReport, ValidationError, build_lorenz, evaluate, evaluate_records};

use crate::PipelineError;
use crate::input::{PointRow, PointSource};
use crate::progress::{ProgressCallback, null_progress};

/// Everything a run produced, including how far it got.
///
/// `error` is set (and mirrored as text in `summary.error`) when a stage
/// aborted; the outputs of the stages before it are still present.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Bookkeeping counts, always populated.
    pub summary: RunSummary,
    /// Attributions in partition order, then point order, then unit id.
    pub attributions: Vec<Attribution>,
    /// One table per configured granularity.
    pub aggregates: Vec<AggregateTable>,
    /// Coverage ratios and mask flags.
    pub coverage: Option<CoverageReport>,
    /// Inequality curve over reportable units.
    pub lorenz: Option<LorenzCurve>,
    /// Headline validation figures.
    pub validation: Option<ValidationSummary>,
    /// The error that aborted the run, if any.
    pub error: Option<PipelineError>,
}

impl RunReport {
    /// Whether every stage completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn fail(&mut self, error: PipelineError) {
        log::error!("Run aborted: {error}");
        self.summary.error = Some(error.to_string());
        self.error = Some(error);
    }
}

/// Output of the attribution stage.
#[derive(Debug)]
pub struct AttributionRun {
    /// Point-level counts and partition failures.
    pub summary: RunSummary,
    /// Attributions in partition order.
    pub attributions: Vec<Attribution>,
    /// Weighted activity `T_i` per unit.
    pub activity: BTreeMap<String, f64>,
    partials: Vec<PartialAggregate>,
}

/// A configured run.
pub struct Pipeline {
    config: RunConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl Pipeline {
    /// Creates a pipeline with a validated configuration and no progress
    /// reporting.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `config` is invalid.
    pub fn new(config: RunConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            progress: null_progress(),
        })
    }

    /// Reports partition progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every stage: attribution, aggregation, coverage and inequality.
    ///
    /// Unit populations come from the polygon units, overridden per unit by
    /// `population` when given.
    #[must_use]
    pub fn run(
        &self,
        index: &GeometryIndex,
        sources: &[&dyn PointSource],
        population: Option<&BTreeMap<String, i64>>,
    ) -> RunReport {
        let mut report = RunReport::default();

        let aggregators = match Aggregator::from_config(&self.config) {
            Ok(aggregators) => aggregators,
            Err(e) => {
                report.fail(e.into());
                return report;
            }
        };

        let attributed = match self.attribute_with(index, sources, &aggregators) {
            Ok(attributed) => attributed,
            Err(e) => {
                report.fail(e);
                return report;
            }
        };
        report.summary = attributed.summary;
        report.attributions = attributed.attributions;
        report.aggregates = aggregators
            .iter()
            .zip(attributed.partials)
            .map(|(aggregator, partial)| aggregator.finish(partial))
            .collect();

        let population = resolve_population(index, population);
        let coverage = evaluate(
            &attributed.activity,
            &population,
            f64::from(self.config.min_sample_threshold),
        );
        finish_validation(&mut report, coverage);
        report
    }

    /// Runs the attribution stage only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the attributor cannot be configured.
    /// Failing sources and partitions are recorded in the summary instead.
    pub fn attribute(
        &self,
        index: &GeometryIndex,
        sources: &[&dyn PointSource],
    ) -> Result<AttributionRun, PipelineError> {
        self.attribute_with(index, sources, &[])
    }

    /// Re-evaluates a previously written coverage table with this
    /// pipeline's threshold and rebuilds the inequality curve.
    #[must_use]
    pub fn remask(&self, records: &[CoverageRecord]) -> RunReport {
        let mut report = RunReport::default();
        let coverage = evaluate_records(records, f64::from(self.config.min_sample_threshold));
        finish_validation(&mut report, coverage);
        report
    }

    fn attribute_with(
        &self,
        index: &GeometryIndex,
        sources: &[&dyn PointSource],
        aggregators: &[Aggregator],
    ) -> Result<AttributionRun, PipelineError> {
        let attributor = Attributor::new(index, &self.config)?;
        let mut summary = RunSummary::default();

        let mut partitions: Vec<Partition> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for source in sources {
            let name = source.name();
            self.progress.set_message(format!("Reading {name}"));
            match source.read() {
                Ok(rows) => {
                    summary.duplicate_ids += count_duplicate_ids(&rows, &mut seen_ids);
                    let chunks = rows.chunks(self.config.partition_size.max(1));
                    partitions.extend(chunks.enumerate().map(|(i, rows)| Partition {
                        label: format!("{name}#{i}"),
                        rows: rows.to_vec(),
                    }));
                }
                Err(e) => {
                    log::warn!("Skipping source {name}: {e}");
                    summary.partitions_total += 1;
                    summary.record_partition_failure(name, e.to_string());
                }
            }
        }
        summary.partitions_total += partitions.len() as u64;
        if summary.duplicate_ids > 0 {
            log::warn!(
                "{} point records repeat an earlier id; each is attributed separately",
                summary.duplicate_ids
            );
        }

        let workers = self.config.effective_workers().min(partitions.len()).max(1);
        log::info!(
            "Attributing {} partitions on {workers} workers",
            partitions.len()
        );
        self.progress.set_total(partitions.len() as u64);

        let outcomes = self.process_partitions(
            &partitions,
            workers,
            attributor,
            aggregators,
            self.config.weighting,
        );

        let merged = merge_outcomes(summary, &partitions, outcomes, aggregators)?;
        let summary = &merged.summary;

        self.progress.finish(format!(
            "Attributed {} of {} points",
            summary.attributed_points, summary.input
        ));
        log::info!(
            "Attribution complete: {} input, {} dropped, {} unattributed, {} attributions over {} points, {} failed partitions",
            summary.input,
            summary.dropped,
            summary.unattributed,
            summary.attributions,
            summary.attributed_points,
            summary.partitions_failed,
        );

        Ok(merged)
    }

    /// Processes `partitions` on `workers` scoped threads and returns one
    /// outcome per partition, in partition order.
    fn process_partitions(
        &self,
        partitions: &[Partition],
        workers: usize,
        attributor: Attributor<'_>,
        aggregators: &[Aggregator],
        weighting: Weighting,
    ) -> Vec<Result<PartitionOutput, String>> {
        let next = &AtomicUsize::new(0);
        let progress = &self.progress;

        let mut outcomes: Vec<Option<Result<PartitionOutput, String>>> =
            partitions.iter().map(|_| None).collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            let Some(partition) = partitions.get(i) else {
                                break;
                            };
                            let outcome = catch_unwind(AssertUnwindSafe(|| {
                                process_partition(
                                    attributor,
                                    aggregators,
                                    weighting,
                                    &partition.rows,
                                )
                            }));
                            let outcome = match outcome {
                                Ok(Ok(output)) => Ok(output),
                                Ok(Err(e)) => Err(e.to_string()),
                                Err(panic) => Err(panic_message(panic.as_ref())),
                            };
                            progress.inc(1);
                            done.push((i, outcome));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(done) => {
                        for (i, outcome) in done {
                            outcomes[i] = Some(outcome);
                        }
                    }
                    Err(panic) => {
                        log::error!("Worker thread died: {}", panic_message(panic.as_ref()));
                    }
                }
            }
        });

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| Err("worker thread died".to_string())))
            .collect()
    }
}

struct Partition {
    label: String,
    rows: Vec<PointRow>,
}

struct PartitionOutput {
    summary: RunSummary,
    attributions: Vec<Attribution>,
    activity: BTreeMap<String, f64>,
    partials: Vec<PartialAggregate>,
}

/// Folds partition outcomes into `summary` in partition order. A failed
/// partition still counts its rows as input, under `failed_rows`.
fn merge_outcomes(
    mut summary: RunSummary,
    partitions: &[Partition],
    outcomes: Vec<Result<PartitionOutput, String>>,
    aggregators: &[Aggregator],
) -> Result<AttributionRun, AggregateError> {
    let mut attributions = Vec::new();
    let mut activity: BTreeMap<String, f64> = BTreeMap::new();
    let mut partials: Vec<PartialAggregate> =
        aggregators.iter().map(Aggregator::partial).collect();

    for (partition, outcome) in partitions.iter().zip(outcomes) {
        match outcome {
            Ok(output) => {
                summary.absorb(output.summary);
                attributions.extend(output.attributions);
                for (unit_id, t) in output.activity {
                    *activity.entry(unit_id).or_insert(0.0) += t;
                }
                for (merged, partial) in partials.iter_mut().zip(output.partials) {
                    merged.merge(partial)?;
                }
            }
            Err(message) => {
                log::warn!("Partition {} failed: {message}", partition.label);
                let rows = partition.rows.len() as u64;
                summary.input += rows;
                summary.failed_rows += rows;
                summary.record_partition_failure(partition.label.clone(), message);
            }
        }
    }

    Ok(AttributionRun {
        summary,
        attributions,
        activity,
        partials,
    })
}

/// Counts readable records whose non-empty id was already seen.
fn count_duplicate_ids(rows: &[PointRow], seen: &mut HashSet<String>) -> u64 {
    let mut duplicates = 0;
    for record in rows.iter().flatten() {
        let id = record.id.trim();
        if !id.is_empty() && !seen.insert(id.to_string()) {
            log::debug!("Duplicate point id {id}");
            duplicates += 1;
        }
    }
    duplicates
}

fn process_partition(
    attributor: Attributor<'_>,
    aggregators: &[Aggregator],
    weighting: Weighting,
    rows: &[PointRow],
) -> Result<PartitionOutput, AggregateError> {
    let mut summary = RunSummary::default();
    let mut attributions = Vec::new();
    let mut records = Vec::new();

    for row in rows {
        summary.input += 1;
        let record = match row {
            Ok(record) => record.clone(),
            Err(reason) => {
                summary.record_rejection(*reason);
                continue;
            }
        };
        match attributor.attribute_record(record) {
            Err(reason) => summary.record_rejection(reason),
            Ok((_, AttributionOutcome::Unattributed)) => summary.unattributed += 1,
            Ok((point, outcome)) => {
                summary.attributed_points += 1;
                summary.attributions += outcome.attributions().len() as u64;
                records.extend(outcome.records(&point));
                attributions.extend_from_slice(outcome.attributions());
            }
        }
    }

    let mut partials: Vec<PartialAggregate> =
        aggregators.iter().map(Aggregator::partial).collect();
    for partial in &mut partials {
        partial.extend(&records)?;
    }

    Ok(PartitionOutput {
        summary,
        attributions,
        activity: activity_by_unit(&records, weighting),
        partials,
    })
}

/// Population per unit from the polygon set, with `overrides` taking
/// precedence.
fn resolve_population(
    index: &GeometryIndex,
    overrides: Option<&BTreeMap<String, i64>>,
) -> BTreeMap<String, i64> {
    let mut population: BTreeMap<String, i64> = index
        .units()
        .iter()
        .filter_map(|unit| unit.population.map(|p| (unit.id.clone(), p)))
        .collect();
    if let Some(overrides) = overrides {
        population.extend(overrides.iter().map(|(id, p)| (id.clone(), *p)));
    }
    population
}

fn finish_validation(report: &mut RunReport, coverage: Result<CoverageReport, ValidationError>) {
    let coverage = match coverage {
        Ok(coverage) => coverage,
        Err(e) => {
            report.fail(e.into());
            return;
        }
    };

    report.summary.excluded_units = coverage.excluded_units as u64;
    report.summary.masked_units = coverage.masked().count() as u64;
    report.summary.reportable_units = coverage.reportable().count() as u64;

    match build_lorenz(&coverage.records) {
        Ok(lorenz) => {
            report.summary.gini = Some(lorenz.gini);
            report.validation = Some(coverage.summary(lorenz.gini));
            report.lorenz = Some(lorenz);
            report.coverage = Some(coverage);
        }
        Err(e) => {
            report.coverage = Some(coverage);
            report.fail(e.into());
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "partition panicked".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use geo::{LineString, MultiPolygon, Polygon};
    use geo_coverage_models::point::parse_timestamp;
    use geo_coverage_models::{GroupField, PointRecord};
    use geo_coverage_spatial::PolygonUnit;

    use super::*;
    use crate::input::MemoryBatch;

    fn square(id: &str, x0: f64, population: i64) -> PolygonUnit {
        let ring = LineString::from(vec![
            (x0, 0.0),
            (x0 + 0.1, 0.0),
            (x0 + 0.1, 0.1),
            (x0, 0.1),
            (x0, 0.0),
        ]);
        PolygonUnit::new(
            id,
            Some(population),
            MultiPolygon(vec![Polygon::new(ring, vec![])]),
            None,
            Some(5_000.0),
        )
    }

    fn index() -> GeometryIndex {
        GeometryIndex::build(vec![
            square("1", 0.0, 100),
            square("2", 0.2, 100),
            square("3", 0.4, 100),
        ])
        .unwrap()
    }

    fn point(id: usize, lng: f64, day: u32) -> PointRecord {
        PointRecord {
            id: format!("p{id}"),
            latitude: Some(0.05),
            longitude: Some(lng),
            error_radius_m: None,
            is_exact: true,
            value: Some(0.5),
            timestamp: parse_timestamp(&format!("2021-06-{day:02}")),
            user_id: Some(format!("u{}", id % 3)),
        }
    }

    /// 10 points in unit 1, 20 in unit 2, none in unit 3.
    fn batch() -> MemoryBatch {
        let mut records: Vec<PointRecord> = (0..10).map(|i| point(i, 0.05, 1)).collect();
        records.extend((10..30).map(|i| point(i, 0.25, 2)));
        MemoryBatch::new("batch", records)
    }

    fn config(partition_size: usize, workers: usize) -> RunConfig {
        RunConfig {
            min_sample_threshold: 5,
            partition_size,
            workers,
            ..RunConfig::default()
        }
    }

    #[test]
    fn end_to_end_three_units() {
        let pipeline = Pipeline::new(config(7, 3)).unwrap();
        let index = index();
        let batch = batch();
        let report = pipeline.run(&index, &[&batch], None);

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.summary.input, 30);
        assert_eq!(report.summary.attributions, 30);
        assert_eq!(report.summary.partitions_total, 5);
        assert_eq!(report.summary.masked_units, 1);
        assert_eq!(report.summary.reportable_units, 2);

        let coverage = report.coverage.as_ref().unwrap();
        assert!((coverage.records[0].coverage_ratio - 1.0).abs() < 1e-12);
        assert!((coverage.records[1].coverage_ratio - 2.0).abs() < 1e-12);
        assert!(coverage.records[2].masked);

        assert_eq!(report.aggregates.len(), 3);
        let by_day = &report.aggregates[0];
        assert_eq!(by_day.bucket(&["2021-06-02", "2"]).unwrap().record_count, 20);
        assert!(report.summary.gini.is_some());
    }

    #[test]
    fn output_is_independent_of_partitioning() {
        let index = index();
        let batch = batch();
        let serial = Pipeline::new(config(1_000, 1)).unwrap().run(&index, &[&batch], None);
        let parallel = Pipeline::new(config(3, 4)).unwrap().run(&index, &[&batch], None);

        assert_eq!(serial.attributions, parallel.attributions);
        assert_eq!(serial.aggregates, parallel.aggregates);
        assert_eq!(
            serial.coverage.unwrap().records,
            parallel.coverage.unwrap().records
        );
    }

    #[test]
    fn rejected_rows_are_counted_not_fatal() {
        let mut records = vec![point(0, 0.05, 1), point(1, 0.05, 1), point(2, 5.0, 1)];
        records[1].latitude = None;
        let batch = MemoryBatch::new("mixed", records);
        let report = Pipeline::new(config(10, 1))
            .unwrap()
            .attribute(&index(), &[&batch])
            .unwrap();

        assert_eq!(report.summary.input, 3);
        assert_eq!(report.summary.dropped, 1);
        assert_eq!(report.summary.dropped_by_reason["missing_coordinates"], 1);
        assert_eq!(report.summary.unattributed, 1);
        assert_eq!(report.summary.attributed_points, 1);
        assert_eq!(report.attributions.len(), 1);
    }

    struct Broken;

    impl PointSource for Broken {
        fn name(&self) -> String {
            "broken".to_string()
        }

        fn read(&self) -> Result<Vec<PointRow>, PipelineError> {
            Err(PipelineError::Format {
                path: "broken".into(),
                message: "unreadable".to_string(),
            })
        }
    }

    #[test]
    fn failing_source_is_recorded_and_run_continues() {
        let batch = batch();
        let report = Pipeline::new(config(100, 2))
            .unwrap()
            .run(&index(), &[&Broken, &batch], None);

        assert!(report.is_success());
        assert_eq!(report.summary.partitions_failed, 1);
        assert_eq!(report.summary.partitions_total, 2);
        assert_eq!(report.summary.partition_failures[0].partition, "broken");
        assert_eq!(report.summary.input, 30);
    }

    #[test]
    fn population_overrides_and_missing_population() {
        let index = index();
        let batch = batch();
        let pipeline = Pipeline::new(config(100, 1)).unwrap();

        let mut overrides = BTreeMap::new();
        overrides.insert("2".to_string(), 200);
        let report = pipeline.run(&index, &[&batch], Some(&overrides));
        let coverage = report.coverage.unwrap();
        assert_eq!(coverage.total_population, 400);
        assert!((coverage.records[1].coverage_ratio - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(coverage.records[1].population, 200);

        let unpopulated = GeometryIndex::build(vec![PolygonUnit::new(
            "1",
            None,
            index.units()[0].boundary.clone(),
            None,
            Some(5_000.0),
        )])
        .unwrap();
        let report = pipeline.run(&unpopulated, &[&batch], None);
        assert!(matches!(
            report.error,
            Some(PipelineError::Validation(ValidationError::MissingPopulation { .. }))
        ));
        assert!(report.summary.error.is_some());
        assert_eq!(report.summary.attributed_points, 10);
    }

    #[test]
    fn everything_masked_keeps_coverage_but_fails() {
        let batch = batch();
        let pipeline = Pipeline::new(RunConfig {
            min_sample_threshold: 1_000,
            ..config(100, 1)
        })
        .unwrap();
        let report = pipeline.run(&index(), &[&batch], None);
        assert!(matches!(
            report.error,
            Some(PipelineError::Validation(ValidationError::NoReportableUnits))
        ));
        assert_eq!(report.coverage.unwrap().masked().count(), 3);
        assert_eq!(report.summary.masked_units, 3);
    }

    #[test]
    fn remask_with_stricter_threshold() {
        let index = index();
        let batch = batch();
        let first = Pipeline::new(config(100, 1)).unwrap().run(&index, &[&batch], None);
        let records = first.coverage.unwrap().records;

        let stricter = Pipeline::new(RunConfig {
            min_sample_threshold: 15,
            ..config(100, 1)
        })
        .unwrap()
        .remask(&records);
        assert!(stricter.is_success());
        assert_eq!(stricter.summary.reportable_units, 1);
        assert!(stricter.summary.gini.unwrap().abs() < 1e-9);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RunConfig {
            group_keys: vec![vec![]],
            ..RunConfig::default()
        };
        assert!(Pipeline::new(config).is_err());

        let config = RunConfig {
            group_keys: vec![vec![GroupField::UnitId]],
            ..RunConfig::default()
        };
        assert!(Pipeline::new(config).is_ok());
    }

    #[test]
    fn failed_partition_rows_stay_in_input() {
        let index = index();
        let config = config(10, 1);
        let attributor = Attributor::new(&index, &config).unwrap();
        let rows = batch().read().unwrap();
        let partitions: Vec<Partition> = rows
            .chunks(20)
            .enumerate()
            .map(|(i, rows)| Partition {
                label: format!("batch#{i}"),
                rows: rows.to_vec(),
            })
            .collect();

        let first = process_partition(attributor, &[], Weighting::Confidence, &partitions[0].rows);
        let outcomes = vec![
            first.map_err(|e| e.to_string()),
            Err("partition panicked".to_string()),
        ];
        let merged = merge_outcomes(RunSummary::default(), &partitions, outcomes, &[]).unwrap();

        assert_eq!(merged.summary.input, 30);
        assert_eq!(merged.summary.failed_rows, 10);
        assert_eq!(merged.summary.attributed_points, 20);
        assert_eq!(merged.summary.partitions_failed, 1);
        assert_eq!(merged.summary.partition_failures[0].partition, "batch#1");
        assert_eq!(merged.attributions.len(), 20);
    }

    #[test]
    fn repeated_ids_are_counted_across_sources() {
        let first = MemoryBatch::new("first", vec![point(0, 0.05, 1), point(1, 0.05, 1)]);
        let mut repeat = point(2, 0.25, 1);
        repeat.id = "p0".to_string();
        let second = MemoryBatch::new("second", vec![repeat, point(1, 0.25, 1), point(3, 0.25, 1)]);

        let run = Pipeline::new(config(1, 2))
            .unwrap()
            .attribute(&index(), &[&first, &second])
            .unwrap();
        assert_eq!(run.summary.duplicate_ids, 2);
        assert_eq!(run.summary.input, 5);
        assert_eq!(run.summary.attributed_points, 5);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, total: u64) {
            self.events.lock().unwrap().push(format!("total {total}"));
        }
        fn inc(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("inc {delta}"));
        }
        fn set_message(&self, msg: String) {
            self.events.lock().unwrap().push(msg);
        }
        fn finish(&self, msg: String) {
            self.events.lock().unwrap().push(format!("finish {msg}"));
        }
    }

    #[test]
    fn progress_follows_sources_and_partitions() {
        let recorder = Arc::new(Recorder::default());
        let batch = batch();
        Pipeline::new(config(10, 2))
            .unwrap()
            .with_progress(recorder.clone())
            .attribute(&index(), &[&batch])
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events[0], "Reading batch");
        assert_eq!(events[1], "total 3");
        assert_eq!(events.iter().filter(|e| *e == "inc 1").count(), 3);
        assert_eq!(events.last().unwrap(), "finish Attributed 30 of 30 points");
    }
}

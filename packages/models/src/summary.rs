//! Run summary bookkeeping.
//!
//! A [`RunSummary`] is produced by every run, successful or not, so that
//! partial progress is always inspectable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::PointRejection;

/// A point partition that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFailure {
    /// Name of the partition (file path or batch label).
    pub partition: String,
    /// What went wrong.
    pub message: String,
}

/// Counts describing one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Point records read, including those of partitions that failed.
    pub input: u64,
    /// Rows of `input` lost with a failed partition.
    pub failed_rows: u64,
    /// Readable records whose id repeats an earlier record's id. They are
    /// still attributed.
    pub duplicate_ids: u64,
    /// Records dropped by validation.
    pub dropped: u64,
    /// Dropped records per [`PointRejection`] reason.
    pub dropped_by_reason: BTreeMap<String, u64>,
    /// Valid points that intersected no polygon unit.
    pub unattributed: u64,
    /// Valid points with at least one attribution.
    pub attributed_points: u64,
    /// Attributions emitted (one point may emit several).
    pub attributions: u64,
    /// Partitions scheduled.
    pub partitions_total: u64,
    /// Partitions that failed.
    pub partitions_failed: u64,
    /// Failure details, one per failed partition.
    pub partition_failures: Vec<PartitionFailure>,
    /// Units excluded from coverage because their population is not positive.
    pub excluded_units: u64,
    /// Units masked by the minimum-sample threshold.
    pub masked_units: u64,
    /// Units passing the minimum-sample threshold.
    pub reportable_units: u64,
    /// Gini coefficient, when the run got that far.
    pub gini: Option<f64>,
    /// Message of the error that aborted the run, if any.
    pub error: Option<String>,
}

impl RunSummary {
    /// Counts one dropped record.
    pub fn record_rejection(&mut self, reason: PointRejection) {
        self.dropped += 1;
        *self
            .dropped_by_reason
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    /// Counts one failed partition.
    pub fn record_partition_failure(
        &mut self,
        partition: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.partitions_failed += 1;
        self.partition_failures.push(PartitionFailure {
            partition: partition.into(),
            message: message.into(),
        });
    }

    /// Folds the point-level counts of a partition summary into this one.
    pub fn absorb(&mut self, other: Self) {
        self.input += other.input;
        self.failed_rows += other.failed_rows;
        self.duplicate_ids += other.duplicate_ids;
        self.dropped += other.dropped;
        for (reason, count) in other.dropped_by_reason {
            *self.dropped_by_reason.entry(reason).or_insert(0) += count;
        }
        self.unattributed += other.unattributed;
        self.attributed_points += other.attributed_points;
        self.attributions += other.attributions;
        self.partitions_failed += other.partitions_failed;
        self.partition_failures.extend(other.partition_failures);
    }
}

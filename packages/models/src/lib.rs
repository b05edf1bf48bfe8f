#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record schemas shared by every stage of the coverage pipeline.
//!
//! Each stage has one fixed schema: raw [`PointRecord`]s are validated into
//! [`ValidPoint`]s, attributed into [`Attribution`]s and
//! [`AttributedRecord`]s, grouped into [`AggregateBucket`]s, and evaluated
//! into [`CoverageRecord`]s and a [`LorenzCurve`]. The [`RunSummary`]
//! carries the bookkeeping counts of a run, and [`RunConfig`] replaces the
//! scattered paths and thresholds of an ad hoc script with one explicit
//! structure.

pub mod aggregate;
pub mod attribution;
pub mod config;
pub mod coverage;
pub mod point;
pub mod summary;

pub use aggregate::{AggregateBucket, AggregateTable, GroupField, QuantileValue, fields_name};
pub use attribution::{AttributedRecord, Attribution, Confidence, ConfidenceError};
pub use config::{ConfidenceLadder, ConfigError, RunConfig, SelectionMode, Weighting};
pub use coverage::{CoverageRecord, LorenzCurve, LorenzPoint, ValidationSummary};
pub use point::{PointRecord, PointRejection, ValidPoint};
pub use summary::{PartitionFailure, RunSummary};

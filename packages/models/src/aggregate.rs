//! Aggregate bucket schema and group-key fields.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::AttributedRecord;

/// A categorical field an aggregation pass can group by.
///
/// Time fields are derived from the record timestamp in UTC.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupField {
    /// Calendar day, `YYYY-MM-DD`.
    Day,
    /// Month of year, `MM`.
    Month,
    /// Year, `YYYY`.
    Year,
    /// Year and month, `YYYY-MM`.
    YearMonth,
    /// Polygon unit identifier.
    UnitId,
}

impl GroupField {
    /// Extracts this field's value from a record.
    #[must_use]
    pub fn extract(self, record: &AttributedRecord) -> String {
        match self {
            Self::Day => record.timestamp.format("%Y-%m-%d").to_string(),
            Self::Month => record.timestamp.format("%m").to_string(),
            Self::Year => record.timestamp.format("%Y").to_string(),
            Self::YearMonth => record.timestamp.format("%Y-%m").to_string(),
            Self::UnitId => record.unit_id.clone(),
        }
    }
}

/// A single quantile of a bucket's value distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileValue {
    /// Probability level in [0, 1].
    pub q: f64,
    /// Weighted quantile of the bucket's values at `q`.
    pub value: f64,
}

impl QuantileValue {
    /// Column label for a probability level, e.g. `0.1` -> `q10`,
    /// `0.125` -> `q12.5`.
    #[must_use]
    pub fn label(q: f64) -> String {
        let pct = (q * 1000.0).round() / 10.0;
        if pct.fract() == 0.0 {
            format!("q{pct:.0}")
        } else {
            format!("q{pct}")
        }
    }

    /// Whether `q` is a level in [0, 1] with at most one decimal of a
    /// percent, so that its label reads back as the same level.
    #[must_use]
    pub fn is_valid_level(q: f64) -> bool {
        (0.0..=1.0).contains(&q) && ((q * 1000.0).round() - q * 1000.0).abs() < 1e-6
    }

    /// Parses a label produced by [`QuantileValue::label`] back into a
    /// probability level.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<f64> {
        let pct: f64 = label.strip_prefix('q')?.parse().ok()?;
        (0.0..=100.0).contains(&pct).then(|| pct / 100.0)
    }
}

/// Statistics for one distinct group-key tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// Group-key values, in the order of the table's fields.
    pub key: Vec<String>,
    /// Number of attributed records in the bucket.
    pub record_count: u64,
    /// Number of distinct authors in the bucket.
    pub user_count: u64,
    /// Sum of weights.
    pub weighted_count: f64,
    /// Weighted mean of the values.
    pub weighted_mean: f64,
    /// Weighted sample standard deviation; `None` when undefined.
    pub weighted_std: Option<f64>,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Weighted quantiles, in the configured order.
    pub quantiles: Vec<QuantileValue>,
}

impl AggregateBucket {
    /// Returns the quantile for probability level `q`, if computed.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|qv| (qv.q - q).abs() < 1e-12)
            .map(|qv| qv.value)
    }
}

/// The result of one aggregation pass at one granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    /// Group-key fields, in key order.
    pub fields: Vec<GroupField>,
    /// Quantile levels computed for every bucket.
    pub quantiles: Vec<f64>,
    /// Buckets ordered by key.
    pub buckets: Vec<AggregateBucket>,
}

impl AggregateTable {
    /// Name of this granularity, e.g. `day-unit_id`.
    #[must_use]
    pub fn name(&self) -> String {
        fields_name(&self.fields)
    }

    /// Looks up a bucket by its key values.
    #[must_use]
    pub fn bucket(&self, key: &[&str]) -> Option<&AggregateBucket> {
        self.buckets
            .iter()
            .find(|b| b.key.iter().map(String::as_str).eq(key.iter().copied()))
    }
}

/// Joins group fields into a granularity name.
///
/// Fields are joined with `-` so that `year`+`month` never collides with
/// `year_month`.
#[must_use]
pub fn fields_name(fields: &[GroupField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::Confidence;

    fn record() -> AttributedRecord {
        AttributedRecord {
            point_id: "p".to_string(),
            unit_id: "100010401001000".to_string(),
            confidence: Confidence::ONE,
            value: 0.5,
            timestamp: chrono::Utc.with_ymd_and_hms(2020, 3, 7, 23, 59, 0).unwrap(),
            user_id: None,
        }
    }

    #[test]
    fn extracts_time_fields() {
        let r = record();
        assert_eq!(GroupField::Day.extract(&r), "2020-03-07");
        assert_eq!(GroupField::Month.extract(&r), "03");
        assert_eq!(GroupField::Year.extract(&r), "2020");
        assert_eq!(GroupField::YearMonth.extract(&r), "2020-03");
        assert_eq!(GroupField::UnitId.extract(&r), "100010401001000");
    }

    #[test]
    fn quantile_labels() {
        assert_eq!(QuantileValue::label(0.1), "q10");
        assert_eq!(QuantileValue::label(0.5), "q50");
        assert_eq!(QuantileValue::label(0.7), "q70");
        assert_eq!(QuantileValue::label(0.125), "q12.5");
        assert_eq!(QuantileValue::parse_label("q90"), Some(0.9));
        assert_eq!(QuantileValue::parse_label("mean"), None);
    }

    #[test]
    fn levels_finer_than_a_tenth_of_a_percent_are_invalid() {
        assert!(QuantileValue::is_valid_level(0.125));
        assert!(QuantileValue::is_valid_level(0.999));
        assert!(QuantileValue::is_valid_level(0.0));
        assert!(!QuantileValue::is_valid_level(0.1234));
        assert!(!QuantileValue::is_valid_level(0.1236));
        assert!(!QuantileValue::is_valid_level(1.5));
        assert_eq!(QuantileValue::label(0.1234), QuantileValue::label(0.1236));
    }

    #[test]
    fn granularity_name() {
        assert_eq!(
            fields_name(&[GroupField::Year, GroupField::Month, GroupField::UnitId]),
            "year-month-unit_id"
        );
        assert_eq!(
            fields_name(&[GroupField::YearMonth, GroupField::UnitId]),
            "year_month-unit_id"
        );
    }

    #[test]
    fn group_field_parses_from_str() {
        assert_eq!("year_month".parse::<GroupField>().unwrap(), GroupField::YearMonth);
        assert!("week".parse::<GroupField>().is_err());
    }
}

//! Point records and their validation.
//!
//! A [`PointRecord`] is one geolocated record as it arrives from a point
//! batch, with every field that can be missing in the source kept optional.
//! [`PointRecord::validate`] is the single boundary between raw input and
//! the attribution stage: it either yields a [`ValidPoint`] or names the
//! [`PointRejection`] reason the record was dropped for. Coordinates are
//! never coerced to zero.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A raw point record from a point batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    /// Opaque unique record identifier.
    pub id: String,
    /// Latitude in WGS84 degrees.
    pub latitude: Option<f64>,
    /// Longitude in WGS84 degrees.
    pub longitude: Option<f64>,
    /// Horizontal positional error radius in meters.
    pub error_radius_m: Option<f64>,
    /// Whether the source flagged this position as precise (e.g. GPS).
    pub is_exact: bool,
    /// Numeric payload supplied by the value provider (e.g. a sentiment score).
    pub value: Option<f64>,
    /// When the record was created.
    pub timestamp: Option<DateTime<Utc>>,
    /// Author of the record, used for distinct-user counts.
    pub user_id: Option<String>,
}

/// Reason a [`PointRecord`] was dropped before attribution.
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
pub enum PointRejection {
    /// The record has no identifier.
    EmptyId,
    /// Latitude or longitude is absent.
    MissingCoordinates,
    /// Latitude is not a finite value in [-90, 90].
    InvalidLatitude,
    /// Longitude is not a finite value in [-180, 180].
    InvalidLongitude,
    /// Error radius is negative or not finite.
    InvalidErrorRadius,
    /// The payload value is absent or not finite.
    MissingValue,
    /// The timestamp is absent.
    MissingTimestamp,
    /// A field could not be parsed from its source representation.
    MalformedField,
}

/// A point that passed validation and can be attributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidPoint {
    /// Opaque unique record identifier.
    pub id: String,
    /// Latitude in WGS84 degrees, within [-90, 90].
    pub latitude: f64,
    /// Longitude in WGS84 degrees, within [-180, 180].
    pub longitude: f64,
    /// Non-negative error radius in meters, if one was stated.
    pub error_radius_m: Option<f64>,
    /// Explicit precision flag from the source.
    pub is_exact: bool,
    /// Numeric payload value.
    pub value: f64,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Author of the record.
    pub user_id: Option<String>,
}

impl ValidPoint {
    /// Whether this point should be attributed by exact containment rather
    /// than through an error buffer.
    ///
    /// True when the source flags the point as exact, or when no positive
    /// error radius was stated.
    #[must_use]
    pub fn is_precise(&self) -> bool {
        self.is_exact || self.error_radius_m.is_none_or(|r| r == 0.0)
    }
}

impl PointRecord {
    /// Validates this record into a [`ValidPoint`].
    ///
    /// # Errors
    ///
    /// Returns the first [`PointRejection`] that applies to this record.
    pub fn validate(self) -> Result<ValidPoint, PointRejection> {
        if self.id.trim().is_empty() {
            return Err(PointRejection::EmptyId);
        }

        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(PointRejection::MissingCoordinates);
        };
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PointRejection::InvalidLatitude);
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PointRejection::InvalidLongitude);
        }

        if let Some(radius) = self.error_radius_m
            && (!radius.is_finite() || radius < 0.0)
        {
            return Err(PointRejection::InvalidErrorRadius);
        }

        let value = self
            .value
            .filter(|v| v.is_finite())
            .ok_or(PointRejection::MissingValue)?;
        let timestamp = self.timestamp.ok_or(PointRejection::MissingTimestamp)?;

        Ok(ValidPoint {
            id: self.id,
            latitude,
            longitude,
            error_radius_m: self.error_radius_m,
            is_exact: self.is_exact,
            value,
            timestamp,
            user_id: self.user_id.filter(|u| !u.is_empty()),
        })
    }
}

/// Parses a record timestamp.
///
/// Accepts RFC 3339, `%Y-%m-%d %H:%M:%S` (optionally fractional),
/// `%Y-%m-%dT%H:%M:%S` (optionally fractional) and bare `%Y-%m-%d` dates.
/// Naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses a precision flag. `true`, `True`, `TRUE`, `1` and `yes` are true;
/// anything else, including an empty field, is false.
#[must_use]
pub fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

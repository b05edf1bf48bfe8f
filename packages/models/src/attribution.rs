//! Point-to-polygon attributions and their confidence weights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a value cannot be a [`Confidence`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfidenceError {
    /// The value is NaN, infinite, or outside [0, 1].
    #[error("confidence {value} is outside [0, 1]")]
    OutOfRange {
        /// The rejected value.
        value: f64,
    },
}

/// Trust in a point-to-polygon attribution, guaranteed to lie in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Full confidence, used for exact containment matches.
    pub const ONE: Self = Self(1.0);

    /// Creates a confidence value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfidenceError::OutOfRange`] if `value` is not a finite
    /// number in [0, 1].
    pub fn new(value: f64) -> Result<Self, ConfidenceError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfidenceError::OutOfRange { value })
        }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Whether this confidence carries no weight at all.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ConfidenceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One weighted link between a point and a polygon unit.
///
/// A point may fan out into several attributions. Zero-confidence
/// attributions are never constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Identifier of the attributed point.
    pub point_id: String,
    /// Identifier of the polygon unit.
    pub unit_id: String,
    /// Confidence in (0, 1].
    pub confidence: Confidence,
}

impl Attribution {
    /// Creates an attribution, or `None` when `confidence` is zero.
    #[must_use]
    pub fn new(
        point_id: impl Into<String>,
        unit_id: impl Into<String>,
        confidence: Confidence,
    ) -> Option<Self> {
        if confidence.is_zero() {
            return None;
        }
        Some(Self {
            point_id: point_id.into(),
            unit_id: unit_id.into(),
            confidence,
        })
    }
}

/// An attribution joined with the payload of its point: the input row of
/// the aggregation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedRecord {
    /// Identifier of the attributed point.
    pub point_id: String,
    /// Identifier of the polygon unit.
    pub unit_id: String,
    /// Attribution weight.
    pub confidence: Confidence,
    /// Payload value of the point.
    pub value: f64,
    /// Timestamp of the point.
    pub timestamp: DateTime<Utc>,
    /// Author of the point.
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rejects_out_of_range() {
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.000_001).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
    }

    #[test]
    fn zero_confidence_attribution_is_not_constructed() {
        let zero = Confidence::new(0.0).unwrap();
        assert!(Attribution::new("p", "u", zero).is_none());
        assert!(Attribution::new("p", "u", Confidence::ONE).is_some());
    }

    #[test]
    fn confidence_deserialization_is_validated() {
        let ok: Confidence = serde_json::from_str("0.3").unwrap();
        assert!((ok.get() - 0.3).abs() < f64::EPSILON);
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
    }
}

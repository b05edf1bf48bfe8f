//! Point attribution engine.
//!
//! Precise points are matched by exact containment. Everything else gets a
//! circular error buffer, an R-tree candidate query, an exact intersection
//! test, and one confidence-weighted attribution per surviving unit (or a
//! single unit under the configured [`SelectionMode`]).

use std::cmp::Ordering;

use geo::{Area, BooleanOps, Geometry, Intersects, Polygon};
use geo_coverage_models::{
    AttributedRecord, Attribution, Confidence, PointRecord, PointRejection, RunConfig,
    SelectionMode, ValidPoint,
};

use crate::SpatialError;
use crate::confidence::ConfidenceScorer;
use crate::geometry::circle_buffer;
use crate::index::{GeometryIndex, PolygonUnit};

/// Result of attributing one valid point.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributionOutcome {
    /// One or more units, each with a non-zero confidence.
    Attributed(Vec<Attribution>),
    /// No unit contains or intersects the point. Counted, not an error.
    Unattributed,
}

impl AttributionOutcome {
    fn from_attributions(attributions: Vec<Attribution>) -> Self {
        if attributions.is_empty() {
            Self::Unattributed
        } else {
            Self::Attributed(attributions)
        }
    }

    /// The emitted attributions; empty when unattributed.
    #[must_use]
    pub fn attributions(&self) -> &[Attribution] {
        match self {
            Self::Attributed(attributions) => attributions,
            Self::Unattributed => &[],
        }
    }

    /// Joins the attributions with the point's payload for aggregation.
    #[must_use]
    pub fn records(&self, point: &ValidPoint) -> Vec<AttributedRecord> {
        self.attributions()
            .iter()
            .map(|a| AttributedRecord {
                point_id: a.point_id.clone(),
                unit_id: a.unit_id.clone(),
                confidence: a.confidence,
                value: point.value,
                timestamp: point.timestamp,
                user_id: point.user_id.clone(),
            })
            .collect()
    }
}

/// Attributes points against a shared, read-only [`GeometryIndex`].
///
/// Cheap to copy; every worker can hold its own.
#[derive(Clone, Copy)]
pub struct Attributor<'a> {
    index: &'a GeometryIndex,
    scorer: ConfidenceScorer,
    selection: SelectionMode,
    meters_per_degree: f64,
    buffer_segments: usize,
}

impl<'a> Attributor<'a> {
    /// Creates an attributor for `index` using the run's confidence ladder,
    /// selection mode, and buffer settings.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Config`] if the configuration is invalid.
    pub fn new(index: &'a GeometryIndex, config: &RunConfig) -> Result<Self, SpatialError> {
        config.validate()?;
        Ok(Self {
            index,
            scorer: ConfidenceScorer::new(&config.confidence)?,
            selection: config.selection,
            meters_per_degree: config.radius_to_degree_factor,
            buffer_segments: config.buffer_segments,
        })
    }

    /// The index this attributor queries.
    #[must_use]
    pub const fn index(&self) -> &'a GeometryIndex {
        self.index
    }

    /// Validates and attributes a raw record.
    ///
    /// # Errors
    ///
    /// Returns the [`PointRejection`] reason if the record fails validation.
    pub fn attribute_record(
        &self,
        record: PointRecord,
    ) -> Result<(ValidPoint, AttributionOutcome), PointRejection> {
        let point = record.validate()?;
        let outcome = self.attribute(&point);
        Ok((point, outcome))
    }

    /// Attributes a validated point.
    #[must_use]
    pub fn attribute(&self, point: &ValidPoint) -> AttributionOutcome {
        if point.is_precise() {
            return AttributionOutcome::from_attributions(
                self.index
                    .containing(point.longitude, point.latitude)
                    .and_then(|slot| self.index.unit(slot))
                    .and_then(|unit| Attribution::new(&point.id, &unit.id, Confidence::ONE))
                    .into_iter()
                    .collect(),
            );
        }

        let radius_m = point.error_radius_m.unwrap_or(0.0);
        let buffer = circle_buffer(
            point.longitude,
            point.latitude,
            radius_m / self.meters_per_degree,
            self.buffer_segments,
        );

        let candidates: Vec<&PolygonUnit> = self
            .index
            .query(&Geometry::Polygon(buffer.clone()))
            .into_iter()
            .filter_map(|slot| self.index.unit(slot))
            .filter(|unit| buffer.intersects(&unit.boundary))
            .collect();

        let selected = match self.selection {
            SelectionMode::FanOut => candidates,
            SelectionMode::BestOverlap => best_overlap(&buffer, &candidates).into_iter().collect(),
            SelectionMode::NearestCentroid => {
                nearest_centroid(point, &candidates).into_iter().collect()
            }
        };

        let mut attributions: Vec<Attribution> = selected
            .into_iter()
            .filter_map(|unit| {
                let confidence =
                    self.scorer
                        .score(point.error_radius_m, unit.diameter_m, point.is_exact);
                Attribution::new(&point.id, &unit.id, confidence)
            })
            .collect();
        attributions.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));

        AttributionOutcome::from_attributions(attributions)
    }
}

/// Relative tolerance under which two overlap areas count as equal.
const OVERLAP_TIE_TOLERANCE: f64 = 1e-9;

/// The candidate sharing the largest area with the buffer. Equal overlaps
/// go to the smaller unit id.
fn best_overlap<'u>(
    buffer: &Polygon<f64>,
    candidates: &[&'u PolygonUnit],
) -> Option<&'u PolygonUnit> {
    let mut best: Option<(f64, &PolygonUnit)> = None;

    for &unit in candidates {
        let area = buffer.intersection(&unit.boundary).unsigned_area();
        best = match best {
            None => Some((area, unit)),
            Some((best_area, best_unit)) => {
                let tolerance = OVERLAP_TIE_TOLERANCE * area.max(best_area);
                if area > best_area + tolerance
                    || ((area - best_area).abs() <= tolerance && unit.id < best_unit.id)
                {
                    Some((area, unit))
                } else {
                    Some((best_area, best_unit))
                }
            }
        };
    }

    best.map(|(_, unit)| unit)
}

/// The candidate whose centroid is nearest the point, in degree space.
fn nearest_centroid<'u>(
    point: &ValidPoint,
    candidates: &[&'u PolygonUnit],
) -> Option<&'u PolygonUnit> {
    candidates
        .iter()
        .map(|&unit| {
            let d = (unit.centroid.x() - point.longitude).hypot(unit.centroid.y() - point.latitude);
            (d, unit)
        })
        .min_by(|(da, a), (db, b)| {
            da.partial_cmp(db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(_, unit)| unit)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use proptest::prelude::*;

    use super::*;
    use crate::index::tests::{square, two_squares};

    fn point(lng: f64, lat: f64, radius: Option<f64>, is_exact: bool) -> ValidPoint {
        ValidPoint {
            id: "p1".to_string(),
            latitude: lat,
            longitude: lng,
            error_radius_m: radius,
            is_exact,
            value: 0.25,
            timestamp: chrono::Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap(),
            user_id: Some("u1".to_string()),
        }
    }

    fn attributor(index: &GeometryIndex, selection: SelectionMode) -> Attributor<'_> {
        let config = RunConfig {
            selection,
            ..RunConfig::default()
        };
        Attributor::new(index, &config).unwrap()
    }

    fn unit_ids(outcome: &AttributionOutcome) -> Vec<&str> {
        outcome
            .attributions()
            .iter()
            .map(|a| a.unit_id.as_str())
            .collect()
    }

    #[test]
    fn exact_point_is_contained_with_full_confidence() {
        let index = two_squares();
        let outcome = attributor(&index, SelectionMode::FanOut)
            .attribute(&point(0.05, 0.05, Some(5000.0), true));
        assert_eq!(unit_ids(&outcome), vec!["east"]);
        assert_eq!(outcome.attributions()[0].confidence, Confidence::ONE);
    }

    #[test]
    fn exact_point_outside_everything_is_unattributed() {
        let index = two_squares();
        let outcome =
            attributor(&index, SelectionMode::FanOut).attribute(&point(1.0, 1.0, None, false));
        assert_eq!(outcome, AttributionOutcome::Unattributed);
    }

    #[test]
    fn small_radius_at_centroid_scores_one() {
        let index = two_squares();
        let outcome = attributor(&index, SelectionMode::FanOut)
            .attribute(&point(0.05, 0.05, Some(10.0), false));
        assert_eq!(unit_ids(&outcome), vec!["east"]);
        assert_eq!(outcome.attributions()[0].confidence, Confidence::ONE);
    }

    #[test]
    fn buffer_across_boundary_fans_out() {
        let index = two_squares();
        // 2 km radius straddles x = 0; units are 5 km across.
        let outcome = attributor(&index, SelectionMode::FanOut)
            .attribute(&point(0.001, 0.05, Some(2000.0), false));
        assert_eq!(unit_ids(&outcome), vec!["east", "west"]);
        for a in outcome.attributions() {
            assert!((a.confidence.get() - 0.8).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn bbox_only_candidates_are_discarded() {
        // An L-shaped gap: the buffer's bounding box touches the second unit
        // but the circle itself does not.
        let index = GeometryIndex::build(vec![
            square("a", 0.0, 0.0, 0.1, 5000.0),
            square("b", 0.1003, 0.1003, 0.1, 5000.0),
        ])
        .unwrap();
        let radius_m = 0.0005 * 111_320.0;
        let outcome = attributor(&index, SelectionMode::FanOut)
            .attribute(&point(0.0999, 0.0999, Some(radius_m), false));
        assert_eq!(unit_ids(&outcome), vec!["a"]);
    }

    #[test]
    fn best_overlap_picks_larger_share() {
        let index = two_squares();
        let outcome = attributor(&index, SelectionMode::BestOverlap)
            .attribute(&point(-0.002, 0.05, Some(2000.0), false));
        assert_eq!(unit_ids(&outcome), vec!["west"]);
    }

    #[test]
    fn best_overlap_tie_goes_to_smaller_id() {
        let index = two_squares();
        let outcome = attributor(&index, SelectionMode::BestOverlap)
            .attribute(&point(0.0, 0.05, Some(2000.0), false));
        assert_eq!(unit_ids(&outcome), vec!["east"]);
    }

    #[test]
    fn nearest_centroid_picks_closest() {
        let index = two_squares();
        let outcome = attributor(&index, SelectionMode::NearestCentroid)
            .attribute(&point(0.003, 0.05, Some(2000.0), false));
        assert_eq!(unit_ids(&outcome), vec!["east"]);
    }

    #[test]
    fn invalid_record_is_rejected() {
        let index = two_squares();
        let record = PointRecord {
            id: "bad".to_string(),
            latitude: Some(91.0),
            longitude: Some(0.0),
            error_radius_m: None,
            is_exact: false,
            value: Some(1.0),
            timestamp: Some(chrono::Utc::now()),
            user_id: None,
        };
        assert_eq!(
            attributor(&index, SelectionMode::FanOut)
                .attribute_record(record)
                .unwrap_err(),
            PointRejection::InvalidLatitude
        );
    }

    #[test]
    fn records_carry_point_payload() {
        let index = two_squares();
        let p = point(0.05, 0.05, None, true);
        let outcome = attributor(&index, SelectionMode::FanOut).attribute(&p);
        let records = outcome.records(&p);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit_id, "east");
        assert!((records[0].value - 0.25).abs() < f64::EPSILON);
        assert_eq!(records[0].user_id.as_deref(), Some("u1"));
    }

    proptest! {
        #[test]
        fn exact_points_match_at_most_once(lng in -0.2f64..0.2, lat in -0.05f64..0.15) {
            let index = two_squares();
            let outcome = attributor(&index, SelectionMode::FanOut)
                .attribute(&point(lng, lat, Some(100.0), true));
            prop_assert!(outcome.attributions().len() <= 1);
            for a in outcome.attributions() {
                prop_assert_eq!(a.confidence, Confidence::ONE);
            }
        }

        #[test]
        fn confidences_are_positive(
            lng in -0.15f64..0.15,
            lat in -0.05f64..0.15,
            radius in 1.0f64..50_000.0,
        ) {
            let index = two_squares();
            let outcome = attributor(&index, SelectionMode::FanOut)
                .attribute(&point(lng, lat, Some(radius), false));
            for a in outcome.attributions() {
                prop_assert!(a.confidence.get() > 0.0 && a.confidence.get() <= 1.0);
            }
        }
    }
}

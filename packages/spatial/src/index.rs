//! In-memory R-tree over the polygon units of one geographic universe.

use std::collections::BTreeMap;

use geo::{BoundingRect, Centroid, Contains, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

use crate::SpatialError;
use crate::geometry::{compute_envelope, equal_area_m2, equivalent_diameter};

/// An administrative polygon (census block, tract, ...) with the
/// measurements attribution and coverage need.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonUnit {
    /// Unique unit identifier (e.g. a GEOID).
    pub id: String,
    /// Residents, when the source carried a population figure.
    pub population: Option<i64>,
    /// Area in square meters.
    pub area_m2: f64,
    /// Diameter of the circle with the unit's area, in meters. This is the
    /// scale error radii are compared against.
    pub diameter_m: f64,
    /// Boundary in WGS84 degrees.
    pub boundary: MultiPolygon<f64>,
    /// Centroid of the boundary.
    pub centroid: Point<f64>,
}

impl PolygonUnit {
    /// Builds a unit, computing area and diameter on the sphere when the
    /// source did not supply them.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        population: Option<i64>,
        boundary: MultiPolygon<f64>,
        area_m2: Option<f64>,
        diameter_m: Option<f64>,
    ) -> Self {
        let area_m2 = area_m2
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or_else(|| equal_area_m2(&boundary));
        let diameter_m = diameter_m
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or_else(|| equivalent_diameter(area_m2));
        let centroid = boundary
            .centroid()
            .or_else(|| boundary.bounding_rect().map(|r| r.center().into()))
            .unwrap_or_else(|| Point::new(0.0, 0.0));

        Self {
            id: id.into(),
            population,
            area_m2,
            diameter_m,
            boundary,
            centroid,
        }
    }
}

/// An R-tree entry pointing at a unit by its slot in the index's unit arena.
struct UnitEntry {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for UnitEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Read-only spatial index over a fixed set of polygon units.
///
/// Built once per run and shared by reference across attribution workers.
/// Queries are a conservative bounding-box filter; callers finish the
/// match with an exact geometric test.
pub struct GeometryIndex {
    units: Vec<PolygonUnit>,
    slots_by_id: BTreeMap<String, usize>,
    tree: RTree<UnitEntry>,
}

impl GeometryIndex {
    /// Builds the index.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyPolygonSet`] when `units` is empty and
    /// [`SpatialError::DuplicateUnit`] when two units share an id.
    pub fn build(units: Vec<PolygonUnit>) -> Result<Self, SpatialError> {
        if units.is_empty() {
            return Err(SpatialError::EmptyPolygonSet);
        }

        let mut slots_by_id = BTreeMap::new();
        let mut entries = Vec::with_capacity(units.len());

        for (slot, unit) in units.iter().enumerate() {
            if slots_by_id.insert(unit.id.clone(), slot).is_some() {
                return Err(SpatialError::DuplicateUnit {
                    unit_id: unit.id.clone(),
                });
            }
            let Some(envelope) = compute_envelope(&unit.boundary) else {
                log::warn!("Unit {} has an empty boundary; not indexed", unit.id);
                continue;
            };
            entries.push(UnitEntry { slot, envelope });
        }

        let tree = RTree::bulk_load(entries);
        log::info!("Indexed {} polygon units", tree.size());

        Ok(Self {
            units,
            slots_by_id,
            tree,
        })
    }

    /// Number of units held by the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the index holds no units. Never true for a built index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All units, in build order.
    #[must_use]
    pub fn units(&self) -> &[PolygonUnit] {
        &self.units
    }

    /// The unit stored at `slot`.
    #[must_use]
    pub fn unit(&self, slot: usize) -> Option<&PolygonUnit> {
        self.units.get(slot)
    }

    /// Looks up a unit by id.
    #[must_use]
    pub fn get(&self, unit_id: &str) -> Option<&PolygonUnit> {
        self.slots_by_id.get(unit_id).map(|&slot| &self.units[slot])
    }

    /// Slots of every unit whose bounding box intersects `envelope`.
    #[must_use]
    pub fn query_envelope(&self, envelope: &AABB<[f64; 2]>) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(envelope)
            .map(|entry| entry.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Slots of every unit whose bounding box intersects the bounding box of
    /// `probe`. An empty probe, or one outside every unit, yields no slots.
    #[must_use]
    pub fn query(&self, probe: &geo::Geometry<f64>) -> Vec<usize> {
        probe.bounding_rect().map_or_else(Vec::new, |rect| {
            self.query_envelope(&AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ))
        })
    }

    /// Slot of the unit containing a point.
    ///
    /// Units tile the universe without overlap, so first match wins. Points
    /// lying exactly on a shared boundary are contained by neither side.
    #[must_use]
    pub fn containing(&self, lng: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .find(|entry| self.units[entry.slot].boundary.contains(&point))
            .map(|entry| entry.slot)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use geo::{Rect, polygon};

    use super::*;

    /// Axis-aligned square unit with explicit population and diameter.
    pub(crate) fn square(id: &str, x0: f64, y0: f64, size: f64, diameter_m: f64) -> PolygonUnit {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ];
        PolygonUnit::new(id, Some(100), MultiPolygon(vec![poly]), None, Some(diameter_m))
    }

    /// Two side-by-side squares sharing the edge `x = 0`.
    pub(crate) fn two_squares() -> GeometryIndex {
        GeometryIndex::build(vec![
            square("west", -0.1, 0.0, 0.1, 5000.0),
            square("east", 0.0, 0.0, 0.1, 5000.0),
        ])
        .unwrap()
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(
            GeometryIndex::build(vec![]),
            Err(SpatialError::EmptyPolygonSet)
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = GeometryIndex::build(vec![
            square("a", 0.0, 0.0, 1.0, 1.0),
            square("a", 2.0, 0.0, 1.0, 1.0),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, SpatialError::DuplicateUnit { unit_id } if unit_id == "a"));
    }

    #[test]
    fn containing_finds_single_unit() {
        let index = two_squares();
        let slot = index.containing(0.05, 0.05).unwrap();
        assert_eq!(index.unit(slot).unwrap().id, "east");
        assert!(index.containing(5.0, 5.0).is_none());
    }

    #[test]
    fn query_returns_bbox_candidates() {
        let index = two_squares();
        let probe = geo::Geometry::Rect(Rect::new((-0.01, 0.01), (0.01, 0.02)));
        let ids: Vec<&str> = index
            .query(&probe)
            .into_iter()
            .map(|s| index.unit(s).unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["west", "east"]);
    }

    #[test]
    fn query_outside_all_units_is_empty() {
        let index = two_squares();
        let probe = geo::Geometry::Point(Point::new(10.0, 10.0));
        assert!(index.query(&probe).is_empty());
    }

    #[test]
    fn computes_diameter_when_absent() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.01, y: 0.0),
            (x: 0.01, y: 0.01),
            (x: 0.0, y: 0.01),
            (x: 0.0, y: 0.0),
        ];
        let unit = PolygonUnit::new("u", Some(1), MultiPolygon(vec![poly]), None, None);
        assert!((unit.diameter_m - equivalent_diameter(unit.area_m2)).abs() < 1e-9);
        // Roughly a 1.11 km square: equivalent diameter around 1.26 km.
        assert!((1200.0..1300.0).contains(&unit.diameter_m));
        assert!((unit.centroid.x() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn lookup_by_id() {
        let index = two_squares();
        assert_eq!(index.get("west").unwrap().population, Some(100));
        assert!(index.get("north").is_none());
        assert_eq!(index.len(), 2);
    }
}

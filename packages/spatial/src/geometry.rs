//! Geometry helpers: `GeoJSON` parsing, envelopes, error buffers, and
//! equal-area measurements.

use std::f64::consts::PI;

use geo::{BoundingRect, ChamberlainDuquetteArea, Coord, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;
use rstar::AABB;

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        geometry_to_multipolygon(geom)
    } else {
        None
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`], or `None` for
/// non-areal geometry types.
#[must_use]
pub fn geometry_to_multipolygon(geom: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

/// Builds a circular buffer of `radius_deg` degrees around `(lng, lat)`.
///
/// The circle is drawn in degree space, so it is an ellipse on the ground
/// away from the equator. That matches the meters-per-degree conversion
/// the radius came from.
#[must_use]
pub fn circle_buffer(lng: f64, lat: f64, radius_deg: f64, segments: usize) -> Polygon<f64> {
    let segments = segments.max(3);
    #[allow(clippy::cast_precision_loss)]
    let step = 2.0 * PI / segments as f64;

    let mut coords: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let theta = step * i as f64;
            Coord {
                x: radius_deg.mul_add(theta.cos(), lng),
                y: radius_deg.mul_add(theta.sin(), lat),
            }
        })
        .collect();
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Square envelope enclosing a circle of `radius_deg` around `(lng, lat)`.
#[must_use]
pub fn circle_envelope(lng: f64, lat: f64, radius_deg: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [lng - radius_deg, lat - radius_deg],
        [lng + radius_deg, lat + radius_deg],
    )
}

/// Area of a WGS84 polygon in square meters, measured on the sphere with an
/// equal-area formula.
#[must_use]
pub fn equal_area_m2(mp: &MultiPolygon<f64>) -> f64 {
    mp.chamberlain_duquette_unsigned_area()
}

/// Diameter of the circle with the given area: `2 * sqrt(area / pi)`.
#[must_use]
pub fn equivalent_diameter(area_m2: f64) -> f64 {
    2.0 * (area_m2 / PI).sqrt()
}

#[cfg(test)]
mod tests {
    use geo::{Area, Contains, Point};

    use super::*;

    #[test]
    fn parses_polygon_and_multipolygon() {
        let poly = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;
        let multi = r#"{"type":"MultiPolygon","coordinates":[[[[0,0],[1,0],[1,1],[0,1],[0,0]]],[[[2,2],[3,2],[3,3],[2,3],[2,2]]]]}"#;
        assert_eq!(parse_geojson_to_multipolygon(poly).unwrap().0.len(), 1);
        assert_eq!(parse_geojson_to_multipolygon(multi).unwrap().0.len(), 2);
    }

    #[test]
    fn rejects_non_areal_geometry() {
        let point = r#"{"type":"Point","coordinates":[0,0]}"#;
        assert!(parse_geojson_to_multipolygon(point).is_none());
        assert!(parse_geojson_to_multipolygon("not json").is_none());
    }

    #[test]
    fn circle_buffer_is_closed_and_centered() {
        let circle = circle_buffer(-75.5, 39.0, 0.01, 32);
        assert_eq!(circle.exterior().0.len(), 33);
        assert_eq!(circle.exterior().0.first(), circle.exterior().0.last());
        assert!(circle.contains(&Point::new(-75.5, 39.0)));
        assert!(!circle.contains(&Point::new(-75.48, 39.0)));

        // Inscribed 32-gon area is within 1% of the true circle.
        let expected = PI * 0.01 * 0.01;
        assert!((circle.unsigned_area() - expected).abs() / expected < 0.01);
    }

    #[test]
    fn equivalent_diameter_inverts_circle_area() {
        let d = 5000.0;
        let area = PI * (d / 2.0) * (d / 2.0);
        assert!((equivalent_diameter(area) - d).abs() < 1e-9);
    }

    #[test]
    fn equal_area_of_small_equatorial_square() {
        // 0.01 x 0.01 degree square at the equator is roughly 1.11 km a side.
        let mp = parse_geojson_to_multipolygon(
            r#"{"type":"Polygon","coordinates":[[[0,0],[0.01,0],[0.01,0.01],[0,0.01],[0,0]]]}"#,
        )
        .unwrap();
        let area = equal_area_m2(&mp);
        assert!((1.2e6..1.3e6).contains(&area), "area was {area}");
    }
}

//! Polygons on canonical coordinates, aware of the 0°/360° wrap.
//!
//! A polygon is an implicitly closed ring of vertices. When any edge spans
//! more than 180° of longitude the ring is taken to cross the wrap meridian,
//! and two halves are derived at construction time: the *left* half lives on
//! the 180–360 side (crossing points at lon 360) and the *right* half on the
//! 0–180 side (crossing points at lon 0). Containment then works per half on
//! a flat (lat, lon) plane.

use std::fmt;
use std::str::FromStr;

use super::types::{GeoError, GeoPoint, Segment, FULL_CIRCLE};
use super::{distance, project};

/// An immutable geographic polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<GeoPoint>,
    halves: Option<Box<(Polygon, Polygon)>>,
}

impl Polygon {
    /// Creates a polygon from its vertices.
    ///
    /// Vertices are used as given; canonicalize them first if they come from
    /// an untrusted source.
    pub fn new(vertices: Vec<GeoPoint>) -> Result<Self, GeoError> {
        if vertices.is_empty() {
            return Err(GeoError::EmptyPolygon);
        }
        Ok(Self::from_vertices(vertices))
    }

    /// Square of side `2 * radius` centered on `center`.
    pub fn square(center: GeoPoint, radius: f64) -> Self {
        let first = project(center, 45.0, radius * std::f64::consts::SQRT_2);
        let second = project(first, 180.0, 2.0 * radius);
        let third = project(second, 270.0, 2.0 * radius);
        let fourth = project(third, 0.0, 2.0 * radius);
        Self::from_vertices(vec![first, second, third, fourth])
    }

    /// Rectangle of `width` by `length` extending from `origin` along `heading`.
    ///
    /// `origin` is the midpoint of the near width side.
    pub fn rectangle(origin: GeoPoint, heading: f64, width: f64, length: f64) -> Self {
        let first = project(origin, (heading + 270.0) % FULL_CIRCLE, width / 2.0);
        let second = project(first, heading, length);
        let third = project(second, (heading + 90.0) % FULL_CIRCLE, width);
        let fourth = project(third, (heading + 180.0) % FULL_CIRCLE, length);
        Self::from_vertices(vec![first, second, third, fourth])
    }

    /// Builds a polygon and derives its halves. `vertices` must be non-empty.
    fn from_vertices(vertices: Vec<GeoPoint>) -> Self {
        let halves = if detect_crossing(&vertices) {
            Some(Box::new(split_halves(&vertices)))
        } else {
            None
        };
        Self { vertices, halves }
    }

    /// Builds a polygon that is never split, for halves and recentered copies.
    fn flat(vertices: Vec<GeoPoint>) -> Self {
        Self {
            vertices,
            halves: None,
        }
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// True if the polygon spans the 0°/360° meridian.
    pub fn crosses_meridian(&self) -> bool {
        self.halves.is_some()
    }

    /// Left and right halves when the polygon crosses the wrap meridian.
    pub fn halves(&self) -> Option<(&Polygon, &Polygon)> {
        self.halves.as_deref().map(|(left, right)| (left, right))
    }

    /// Splits along the 0° meridian; a non-crossing polygon yields itself.
    pub fn split(&self) -> Vec<Polygon> {
        match self.halves() {
            Some((left, right)) => vec![left.clone(), right.clone()],
            None => vec![self.clone()],
        }
    }

    /// Edges in ring order, starting with the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::new(self.vertices[(i + n - 1) % n], self.vertices[i]))
    }

    /// Length of each side in meters, the closing side last.
    pub fn side_lengths(&self) -> Vec<f64> {
        let n = self.vertices.len();
        (0..n)
            .map(|i| distance(self.vertices[i], self.vertices[(i + 1) % n]))
            .collect()
    }

    /// Even-odd containment test on the (lat, lon) plane.
    pub fn contains(&self, point: GeoPoint) -> bool {
        match self.halves() {
            Some((left, right)) => left.contains(point) || right.contains(point),
            None => ring_contains(&self.vertices, point),
        }
    }

    /// Planar overlap test: a vertex of either polygon inside the other, or
    /// any pair of intersecting edges.
    ///
    /// Both polygons are taken as flat rings; callers compare geometries
    /// that live in the same longitude frame.
    pub fn overlaps(&self, other: &Polygon) -> bool {
        if self
            .vertices
            .iter()
            .any(|v| ring_contains(&other.vertices, *v))
            || other
                .vertices
                .iter()
                .any(|v| ring_contains(&self.vertices, *v))
        {
            return true;
        }
        self.edges()
            .any(|a| other.edges().any(|b| planar_intersect(a, b)))
    }

    /// Moves every vertex by `range` meters along `angle`.
    pub fn project(&self, angle: f64, range: f64) -> Polygon {
        let moved = self
            .vertices
            .iter()
            .map(|v| project(*v, angle, range))
            .collect();
        Self::from_vertices(moved)
    }

    /// Copy with every vertex canonicalized.
    pub fn canonicalized(&self) -> Polygon {
        Self::from_vertices(self.vertices.iter().map(|v| v.canonicalize()).collect())
    }

    /// Copy whose longitudes lie within `central ± 180`.
    ///
    /// Intended for canonical polygons; the result is a flat ring that is
    /// never split again.
    pub fn recentered(&self, central: f64) -> Polygon {
        let low = central - 180.0;
        let high = central + 180.0;
        let shifted = self
            .vertices
            .iter()
            .map(|v| {
                let lon = if v.lon > high {
                    v.lon - FULL_CIRCLE
                } else if v.lon < low {
                    v.lon + FULL_CIRCLE
                } else {
                    v.lon
                };
                GeoPoint::new(v.lat, lon)
            })
            .collect();
        Self::flat(shifted)
    }

    /// Text form with longitudes recentered on `central`.
    pub fn to_string_centered(&self, central: f64) -> String {
        self.recentered(central).to_string()
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.vertices.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str(")")
    }
}

impl FromStr for Polygon {
    type Err = GeoError;

    /// Parses the `((lat,lon),(lat,lon),...)` text form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GeoError::InvalidPolygonText(s.to_string());

        let mut vertices = Vec::new();
        for token in s.split('(').filter(|t| !t.trim().is_empty()) {
            let close = token.find(')').ok_or_else(invalid)?;
            let (body, rest) = token.split_at(close);
            if !rest.chars().all(|c| c == ')' || c == ',' || c.is_whitespace()) {
                return Err(invalid());
            }
            let (lat, lon) = body.split_once(',').ok_or_else(invalid)?;
            let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
            let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
            vertices.push(GeoPoint::new(lat, lon));
        }

        if vertices.is_empty() {
            return Err(invalid());
        }
        Ok(Self::from_vertices(vertices))
    }
}

// =============================================================================
// Wrap detection and splitting
// =============================================================================

/// True when the edge from `a` to `b` jumps across the wrap meridian.
#[inline]
fn is_wrap_edge(a: GeoPoint, b: GeoPoint) -> bool {
    (a.lon - b.lon).abs() > 180.0
}

#[inline]
fn on_wrap_meridian(lon: f64) -> bool {
    lon == 0.0 || lon == FULL_CIRCLE
}

fn detect_crossing(vertices: &[GeoPoint]) -> bool {
    let n = vertices.len();
    if n < 2 {
        return false;
    }
    (0..n).any(|i| {
        let a = vertices[(i + n - 1) % n];
        let b = vertices[i];
        is_wrap_edge(a, b) && !on_wrap_meridian(a.lon) && !on_wrap_meridian(b.lon)
    })
}

/// Walks the ring once, emitting each vertex to the current side and a
/// crossing point to both sides whenever an edge jumps the wrap.
fn split_halves(vertices: &[GeoPoint]) -> (Polygon, Polygon) {
    let n = vertices.len();
    let mut left = Vec::with_capacity(n + 2);
    let mut right = Vec::with_capacity(n + 2);
    let mut on_left = vertices[0].lon > 180.0;

    for i in 1..=n {
        let p1 = vertices[i - 1];
        let p2 = vertices[i % n];

        if is_wrap_edge(p1, p2) {
            let to_meridian = distance(p1, GeoPoint::new(p1.lat, 0.0));
            let from_meridian = distance(GeoPoint::new(p2.lat, 0.0), p2);
            let total = to_meridian + from_meridian;
            let lat = if total > 0.0 {
                to_meridian / total * (p2.lat - p1.lat) + p1.lat
            } else {
                p1.lat
            };
            let crossing = GeoPoint::new(lat, 0.0).canonicalize();
            left.push(GeoPoint::new(crossing.lat, crossing.lon + FULL_CIRCLE));
            right.push(crossing);
            on_left = !on_left;
        }

        if on_left {
            left.push(p2);
        } else {
            right.push(p2);
        }
    }

    (Polygon::flat(left), Polygon::flat(right))
}

// =============================================================================
// Planar primitives
// =============================================================================

fn ring_contains(vertices: &[GeoPoint], point: GeoPoint) -> bool {
    let n = vertices.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[j];
        if (a.lon > point.lon) != (b.lon > point.lon) {
            let lat_at = (b.lat - a.lat) * (point.lon - a.lon) / (b.lon - a.lon) + a.lat;
            if point.lat < lat_at {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[inline]
fn orientation(p: GeoPoint, q: GeoPoint, r: GeoPoint) -> f64 {
    (q.lat - p.lat) * (r.lon - p.lon) - (q.lon - p.lon) * (r.lat - p.lat)
}

#[inline]
fn within_box(p: GeoPoint, q: GeoPoint, r: GeoPoint) -> bool {
    r.lat >= p.lat.min(q.lat)
        && r.lat <= p.lat.max(q.lat)
        && r.lon >= p.lon.min(q.lon)
        && r.lon <= p.lon.max(q.lon)
}

fn planar_intersect(a: Segment, b: Segment) -> bool {
    let d1 = orientation(b.start, b.end, a.start);
    let d2 = orientation(b.start, b.end, a.end);
    let d3 = orientation(a.start, a.end, b.start);
    let d4 = orientation(a.start, a.end, b.end);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && within_box(b.start, b.end, a.start))
        || (d2 == 0.0 && within_box(b.start, b.end, a.end))
        || (d3 == 0.0 && within_box(a.start, a.end, b.start))
        || (d4 == 0.0 && within_box(a.start, a.end, b.end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_polygon(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> Polygon {
        Polygon::new(vec![
            GeoPoint::new(lat0, lon0),
            GeoPoint::new(lat0, lon1),
            GeoPoint::new(lat1, lon1),
            GeoPoint::new(lat1, lon0),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_polygon_rejected() {
        assert_eq!(Polygon::new(vec![]), Err(GeoError::EmptyPolygon));
    }

    #[test]
    fn test_contains_simple_box() {
        let poly = box_polygon(10.0, 20.0, 12.0, 22.0);
        assert!(poly.contains(GeoPoint::new(11.0, 21.0)));
        assert!(!poly.contains(GeoPoint::new(13.0, 21.0)));
        assert!(!poly.contains(GeoPoint::new(11.0, 23.0)));
        assert!(!poly.crosses_meridian());
    }

    #[test]
    fn test_single_vertex_contains_nothing() {
        let p = GeoPoint::new(1.0, 1.0);
        let poly = Polygon::new(vec![p]).unwrap();
        assert!(!poly.contains(p));
        assert_eq!(poly.vertex_count(), 1);
    }

    #[test]
    fn test_square_half_diagonal() {
        let center = GeoPoint::new(42.0, 288.0);
        let radius = 1_000.0;
        let square = Polygon::square(center, radius);
        let d = distance(center, square.vertices()[0]);
        let expected = radius * std::f64::consts::SQRT_2;
        assert!((d - expected).abs() < expected * 0.001, "{} vs {}", d, expected);
        assert!(square.contains(center));
        for side in square.side_lengths() {
            assert!((side - 2.0 * radius).abs() < 20.0, "side {}", side);
        }
    }

    #[test]
    fn test_rectangle_extends_along_heading() {
        let origin = GeoPoint::new(10.0, 20.0);
        let rect = Polygon::rectangle(origin, 0.0, 100.0, 1_000.0);
        let ahead = project(origin, 0.0, 500.0);
        let behind = project(origin, 180.0, 500.0);
        assert!(rect.contains(ahead));
        assert!(!rect.contains(behind));
    }

    #[test]
    fn test_crossing_square_is_split() {
        let square = Polygon::square(GeoPoint::new(10.0, 0.0), 50_000.0);
        assert!(square.crosses_meridian());
        let (left, right) = square.halves().unwrap();
        assert!(left.vertices().iter().all(|v| v.lon >= 180.0));
        assert!(right.vertices().iter().all(|v| v.lon <= 180.0));
        assert!(square.contains(GeoPoint::new(10.0, 359.9)));
        assert!(square.contains(GeoPoint::new(10.0, 0.1)));
        assert!(!square.contains(GeoPoint::new(10.0, 180.0)));
        assert_eq!(square.split().len(), 2);
    }

    #[test]
    fn test_non_crossing_split_returns_itself() {
        let poly = box_polygon(10.0, 20.0, 12.0, 22.0);
        assert_eq!(poly.split(), vec![poly.clone()]);
    }

    #[test]
    fn test_edge_on_meridian_is_not_crossing() {
        let poly = box_polygon(10.0, 0.0, 12.0, 350.0);
        assert!(!poly.crosses_meridian());
    }

    #[test]
    fn test_recentered_shifts_longitudes() {
        let square = Polygon::square(GeoPoint::new(10.0, 0.0), 50_000.0);
        let at_360 = square.recentered(360.0);
        assert!(at_360.vertices().iter().all(|v| v.lon >= 180.0 && v.lon <= 540.0));
        let at_0 = square.recentered(0.0);
        assert!(at_0.vertices().iter().all(|v| v.lon >= -180.0 && v.lon <= 180.0));
        assert!(!at_0.crosses_meridian());
        assert!(at_0.contains(GeoPoint::new(10.0, -0.1)));
    }

    #[test]
    fn test_overlap_detection() {
        let a = box_polygon(0.0, 0.0, 2.0, 2.0);
        let b = box_polygon(1.0, 1.0, 3.0, 3.0);
        let c = box_polygon(5.0, 5.0, 6.0, 6.0);
        // crossing edges without contained vertices
        let d = box_polygon(-1.0, 0.5, 3.0, 1.5);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.overlaps(&d));
        assert!(d.overlaps(&a));
    }

    #[test]
    fn test_point_polygon_overlap() {
        let area = box_polygon(0.0, 0.0, 2.0, 2.0);
        let inside = Polygon::new(vec![GeoPoint::new(1.0, 1.0)]).unwrap();
        let outside = Polygon::new(vec![GeoPoint::new(4.0, 1.0)]).unwrap();
        assert!(inside.overlaps(&area));
        assert!(area.overlaps(&inside));
        assert!(!outside.overlaps(&area));
    }

    #[test]
    fn test_text_form_round_trip() {
        let poly = box_polygon(10.5, 20.25, 12.0, 22.0);
        let text = poly.to_string();
        assert_eq!(text, "((10.5,20.25),(10.5,22),(12,22),(12,20.25))");
        assert_eq!(text.parse::<Polygon>().unwrap(), poly);
    }

    #[test]
    fn test_invalid_text_rejected() {
        assert!("".parse::<Polygon>().is_err());
        assert!("((1,2".parse::<Polygon>().is_err());
        assert!("((1;2))".parse::<Polygon>().is_err());
        assert!("((a,2))".parse::<Polygon>().is_err());
    }

    #[test]
    fn test_project_moves_all_vertices() {
        let poly = box_polygon(10.0, 20.0, 12.0, 22.0);
        let moved = poly.project(0.0, 10_000.0);
        for (before, after) in poly.vertices().iter().zip(moved.vertices()) {
            assert!(after.lat > before.lat);
        }
    }

    #[test]
    fn test_projection_across_meridian_recomputes_split() {
        let poly = box_polygon(10.0, 359.0, 11.0, 359.5);
        assert!(!poly.crosses_meridian());
        let moved = poly.project(90.0, 80_000.0);
        assert!(moved.crosses_meridian());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_points_near_center_stay_inside_after_split(
                lat in -60.0..60.0_f64,
                lon in prop_oneof![0.0..0.3_f64, 359.7..360.0_f64],
                angle in 0.0..360.0_f64,
                fraction in 0.0..0.85_f64
            ) {
                let center = GeoPoint::new(lat, lon);
                let radius = 50_000.0;
                let square = Polygon::square(center, radius);
                let target = project(center, angle, radius * fraction);
                prop_assert!(square.crosses_meridian());
                prop_assert!(square.contains(target), "{:?} not in {}", target, square);
            }

            #[test]
            fn test_far_points_stay_outside_after_split(
                lat in -60.0..60.0_f64,
                lon in prop_oneof![0.0..0.3_f64, 359.7..360.0_f64],
                angle in 0.0..360.0_f64
            ) {
                let center = GeoPoint::new(lat, lon);
                let radius = 50_000.0;
                let square = Polygon::square(center, radius);
                let target = project(center, angle, radius * 3.0);
                prop_assert!(!square.contains(target), "{:?} in {}", target, square);
            }

            #[test]
            fn test_convex_polygon_split_keeps_vertices_and_overlap(
                lat in -50.0..50.0_f64,
                lon in -0.02..0.02_f64,
                n in 4usize..8,
                base in 0.0..360.0_f64,
                jitter in prop::collection::vec(0.0..0.3_f64, 8),
                radius in 30_000.0..60_000.0_f64,
                target_angle in 0.0..360.0_f64,
                target_range in 0.0..1.5_f64
            ) {
                let center = GeoPoint::new(lat, lon).canonicalize();
                let step = FULL_CIRCLE / n as f64;
                let angles: Vec<f64> = (0..n)
                    .map(|i| (base + (i as f64 + jitter[i]) * step) % FULL_CIRCLE)
                    .collect();
                let poly = Polygon::new(
                    angles.iter().map(|a| project(center, *a, radius)).collect(),
                )
                .unwrap();
                prop_assert!(poly.crosses_meridian(), "{} not split", poly);

                let (left, right) = poly.halves().unwrap();
                for v in poly.vertices() {
                    prop_assert!(
                        left.vertices().contains(v) || right.vertices().contains(v),
                        "{:?} lost by split of {}", v, poly
                    );
                }
                prop_assert!(poly.contains(center));
                for a in &angles {
                    let inner = project(center, *a, radius * 0.8);
                    prop_assert!(
                        left.contains(inner) || right.contains(inner),
                        "{:?} near a vertex not in either half of {}", inner, poly
                    );
                }

                let at = project(center, target_angle, radius * target_range);
                let target = Polygon::square(at, 3_000.0);
                prop_assume!(!target.crosses_meridian());
                let frame = if target.vertices()[0].lon > 180.0 { FULL_CIRCLE } else { 0.0 };
                let whole = poly.recentered(frame);

                // skip targets whose answer would change within 2 km of the boundary
                let inner = Polygon::square(at, 1_000.0);
                let outer = Polygon::square(at, 5_000.0);
                prop_assume!(!inner.crosses_meridian() && !outer.crosses_meridian());
                prop_assume!(whole.overlaps(&inner) == whole.overlaps(&outer));

                let split = poly.split();
                prop_assert_eq!(split.len(), 2);
                prop_assert_eq!(
                    whole.overlaps(&target),
                    split.iter().any(|half| half.overlaps(&target)),
                    "target {} against {}", target, poly
                );
            }
        }
    }
}

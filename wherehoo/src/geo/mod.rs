//! Geodesic computations on canonical coordinates.
//!
//! Points use latitude in `[-90, 90]` and longitude in `[0, 360)`. The
//! longitude wrap therefore sits on the 0° meridian, and every function here
//! takes the short way across it.
//!
//! Distances use a spherical haversine scaled by the ellipsoidal radius of
//! curvature at the *origin's* latitude, so `distance(a, b)` and
//! `distance(b, a)` can differ by up to the flattening of the ellipsoid.

mod polygon;
mod types;

pub use polygon::Polygon;
pub use types::{
    normalize_degrees, GeoError, GeoPoint, Quadrant, Segment, FULL_CIRCLE, HEADING_UNDEFINED,
    MAX_LAT, MIN_LAT,
};

use std::f64::consts::PI;

/// WGS84 semi-major axis in meters.
const GEO_A: f64 = 6_378_137.0;

/// WGS84 first eccentricity squared.
const GEO_E2: f64 = 0.006_694_379_990_13;

/// Local radius of curvature at `lat_rad` in meters.
#[inline]
fn local_radius(lat_rad: f64) -> f64 {
    let ra = GEO_A * (1.0 - GEO_E2).sqrt();
    ra / (1.0 - GEO_E2 * lat_rad.sin().powi(2))
}

/// Smaller of the two angular separations between two angles in radians.
#[inline]
fn short_arc(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(2.0 * PI - d)
}

#[inline]
fn signum(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Rounds `value` to `places` decimal places.
#[inline]
fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Initial great-circle heading from `origin` to `end` in degrees.
///
/// Returns 0 when both points coincide and [`HEADING_UNDEFINED`] when the
/// origin is a pole. The result is rounded so that following it for the full
/// distance lands within about a meter of `end`.
pub fn heading(origin: GeoPoint, end: GeoPoint) -> f64 {
    if origin.is_pole() {
        return HEADING_UNDEFINED;
    }

    let raw_dlon = (end.lon - origin.lon).abs();
    let crosses_wrap = raw_dlon > FULL_CIRCLE - raw_dlon;
    let raw_dlat = (end.lat - origin.lat).abs();
    let dlat = raw_dlat.min(FULL_CIRCLE - raw_dlat);
    let dlon = raw_dlon.min(FULL_CIRCLE - raw_dlon);
    if dlat == 0.0 && dlon == 0.0 {
        return 0.0;
    }

    let lat1 = origin.lat.to_radians();
    let lat2 = end.lat.to_radians();
    let dlon_rad = dlon.to_radians();

    let south_north = signum(end.lat - origin.lat);
    let mut west_east = signum(end.lon - origin.lon);
    if crosses_wrap {
        west_east = -west_east;
    }

    let elevation = (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon_rad.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let ratio = (lat2.cos() * dlon_rad.sin() / elevation.cos()).clamp(-1.0, 1.0);
    let mut theta = ratio.asin().abs().to_degrees();
    if !(0.0..=FULL_CIRCLE).contains(&theta) {
        theta = 90.0;
    }

    let bearing = match (south_north, west_east) {
        (1, 0) | (1, 1) | (0, 1) => theta,
        (-1, 1) => 180.0 - theta,
        (-1, 0) => 180.0,
        (-1, -1) | (0, -1) => 180.0 + theta,
        (1, -1) => FULL_CIRCLE - theta,
        _ => 0.0,
    };

    let dist = distance(origin, end).max(1.0);
    let places = dist.log10().round().max(0.0) as u32;
    round_to(bearing, places)
}

/// Distance from `origin` to `end` in meters.
pub fn distance(origin: GeoPoint, end: GeoPoint) -> f64 {
    let lat1 = origin.lat.to_radians();
    let lat2 = end.lat.to_radians();
    let dlat = short_arc(lat2, lat1);
    let dlon = short_arc(end.lon.to_radians(), origin.lon.to_radians());

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    local_radius(lat1) * c
}

/// Displaces `point` by `range` meters along `angle` degrees from north.
///
/// The result is canonicalized.
pub fn project(point: GeoPoint, angle: f64, range: f64) -> GeoPoint {
    let lat = point.lat.to_radians();
    let lon = point.lon.to_radians();
    let theta = angle.to_radians();
    let r = local_radius(lat);

    let dx = range * theta.cos();
    let dy = range * theta.sin();

    let new_lat = lat + dx / r;
    let stretch = ((dy / (2.0 * r)).sin() / new_lat.cos()).clamp(-1.0, 1.0);
    let new_lon = lon + 2.0 * stretch.asin();

    GeoPoint::new(new_lat.to_degrees(), new_lon.to_degrees()).canonicalize()
}

/// Angle at `vertex` between the segment direction and the bearing to `target`.
fn corner_angle(vertex: GeoPoint, along: GeoPoint, target: GeoPoint) -> f64 {
    let angle = (heading(vertex, along) - heading(vertex, target)).abs();
    if angle > 180.0 {
        FULL_CIRCLE - angle
    } else {
        angle
    }
}

/// Heading from `origin` to the nearest point of `segment`.
///
/// The nearest point is the perpendicular foot when it falls within the
/// segment and the closer endpoint otherwise.
pub fn heading_to_segment(origin: GeoPoint, segment: Segment) -> f64 {
    let Segment { start, end } = segment;
    if segment.is_degenerate() {
        return heading(origin, start);
    }

    let at_start = corner_angle(start, end, origin);
    let at_end = corner_angle(end, start, origin);
    if at_start > 90.0 || at_end > 90.0 {
        return if distance(origin, start) < distance(origin, end) {
            heading(origin, start)
        } else {
            heading(origin, end)
        };
    }

    let along = heading(start, end);
    let offside = normalize_degrees(heading(start, origin) - along);
    if offside < 180.0 {
        normalize_degrees(along - 90.0)
    } else {
        normalize_degrees(along + 90.0)
    }
}

/// Distance from `origin` to the nearest point of `segment` in meters.
pub fn distance_to_segment(origin: GeoPoint, segment: Segment) -> f64 {
    let Segment { start, end } = segment;
    if segment.is_degenerate() {
        return distance(origin, start);
    }

    let at_start = corner_angle(start, end, origin);
    let at_end = corner_angle(end, start, origin);
    if at_start > 90.0 || at_end > 90.0 {
        return distance(origin, start).min(distance(origin, end));
    }
    distance(origin, start) * at_start.to_radians().sin()
}

/// Heading from `origin` to the nearest edge of `polygon`, 0 when inside.
pub fn heading_to_polygon(origin: GeoPoint, polygon: &Polygon) -> f64 {
    if let [only] = polygon.vertices() {
        return heading(origin, *only);
    }
    if polygon.contains(origin) {
        return 0.0;
    }
    match nearest_edge(origin, polygon) {
        Some((edge, _)) => heading_to_segment(origin, edge),
        None => 0.0,
    }
}

/// Distance from `origin` to the nearest edge of `polygon`, 0 when inside.
pub fn distance_to_polygon(origin: GeoPoint, polygon: &Polygon) -> f64 {
    if let [only] = polygon.vertices() {
        return distance(origin, *only);
    }
    if polygon.contains(origin) {
        return 0.0;
    }
    nearest_edge(origin, polygon)
        .map(|(_, d)| d)
        .unwrap_or(0.0)
}

fn nearest_edge(origin: GeoPoint, polygon: &Polygon) -> Option<(Segment, f64)> {
    polygon
        .edges()
        .map(|edge| (edge, distance_to_segment(origin, edge)))
        .fold(None, |best, candidate| match best {
            Some((_, d)) if d <= candidate.1 => best,
            _ => Some(candidate),
        })
}

/// Compass octant for a heading in degrees.
pub fn quadrant(angle: f64) -> Quadrant {
    let north = angle > 292.5 || angle <= 67.5;
    let south = angle > 112.5 && angle <= 247.5;
    let east = angle > 22.5 && angle <= 157.5;
    let west = angle > 202.5 && angle <= 337.5;

    match (north, south, east, west) {
        (true, _, true, _) => Quadrant::NE,
        (true, _, _, true) => Quadrant::NW,
        (true, _, _, _) => Quadrant::N,
        (_, true, true, _) => Quadrant::SE,
        (_, true, _, true) => Quadrant::SW,
        (_, true, _, _) => Quadrant::S,
        (_, _, true, _) => Quadrant::E,
        (_, _, _, true) => Quadrant::W,
        _ => Quadrant::N,
    }
}

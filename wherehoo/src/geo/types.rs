//! Core geographic value types.

use std::fmt;

use thiserror::Error;

/// Minimum canonical latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum canonical latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Canonical longitudes live in `[0, FULL_CIRCLE)`.
pub const FULL_CIRCLE: f64 = 360.0;

/// Heading returned when the origin is a pole and no bearing exists.
pub const HEADING_UNDEFINED: f64 = -1.0;

/// Errors produced by geometry construction and parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// A polygon needs at least one vertex.
    #[error("polygon requires at least one vertex")]
    EmptyPolygon,

    /// Polygon text did not follow the `((lat,lon),...)` form.
    #[error("invalid polygon text: {0}")]
    InvalidPolygonText(String),
}

/// A point on Earth in degrees.
///
/// Values are not range-checked on construction; call
/// [`GeoPoint::canonicalize`] to fold them into the canonical ranges
/// (latitude in `[-90, 90]`, longitude in `[0, 360)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point without normalizing it.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns the canonical form of this point.
    ///
    /// Longitude is reduced modulo 360 into `[0, 360)`. Latitude is folded
    /// through the poles: values past ±90 mirror back toward the equator and
    /// values past ±180 continue into the opposite hemisphere.
    pub fn canonicalize(self) -> Self {
        Self {
            lat: fold_latitude(self.lat),
            lon: wrap_longitude(self.lon),
        }
    }

    /// True if the point is already in canonical ranges.
    pub fn is_canonical(&self) -> bool {
        (MIN_LAT..=MAX_LAT).contains(&self.lat) && (0.0..FULL_CIRCLE).contains(&self.lon)
    }

    /// True if the point sits on either pole.
    pub fn is_pole(&self) -> bool {
        self.lat == MAX_LAT || self.lat == MIN_LAT
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.lat, self.lon)
    }
}

/// A great-circle segment between two points, typically a polygon edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: GeoPoint,
    pub end: GeoPoint,
}

impl Segment {
    pub const fn new(start: GeoPoint, end: GeoPoint) -> Self {
        Self { start, end }
    }

    /// True when both endpoints coincide.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

/// Compass octant used in search result headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Quadrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::N => "N",
            Quadrant::NE => "NE",
            Quadrant::E => "E",
            Quadrant::SE => "SE",
            Quadrant::S => "S",
            Quadrant::SW => "SW",
            Quadrant::W => "W",
            Quadrant::NW => "NW",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes any finite angle into `[0, 360)`.
#[inline]
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(FULL_CIRCLE);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= FULL_CIRCLE {
        0.0
    } else {
        wrapped
    }
}

#[inline]
fn wrap_longitude(lon: f64) -> f64 {
    if (0.0..FULL_CIRCLE).contains(&lon) {
        return lon;
    }
    normalize_degrees(lon)
}

#[inline]
fn fold_latitude(lat: f64) -> f64 {
    if (MIN_LAT..=MAX_LAT).contains(&lat) {
        return lat;
    }
    let turned = normalize_degrees(lat);
    if turned <= 90.0 {
        turned
    } else if turned <= 270.0 {
        180.0 - turned
    } else {
        turned - FULL_CIRCLE
    }
}

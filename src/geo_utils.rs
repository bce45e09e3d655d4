//! # Geographic Utilities
//!
//! Geometry primitives used by the track model, the sampler and the aggregator.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two points |
//! | [`polyline_length_km`] | Total length of a polyline |
//! | [`project_point_to_segment`] | Nearest approach of a point to one segment |
//! | [`interpolate`] | Point at a fraction of a segment |
//! | [`compute_bounds`] | Bounding box of a set of points |
//! | [`km_to_degrees`] | Convert kilometers to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use alongtrack::{TrackPoint, geo_utils};
//!
//! let a = TrackPoint::new(45.0, 7.00);
//! let b = TrackPoint::new(45.0, 7.02);
//! let poi = TrackPoint::new(45.005, 7.01);
//!
//! let projection = geo_utils::project_point_to_segment(&poi, &a, &b, 0.0, geo_utils::haversine_km(&a, &b));
//! assert!((projection.t - 0.5).abs() < 0.01);
//! assert!((projection.distance_km - 0.556).abs() < 0.01);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances between track points use the haversine great-circle formula on a sphere
//! with the mean earth radius (6,371.0088 km).
//!
//! ### Local Flat Projection
//!
//! Consecutive track points are rarely more than a few kilometers apart, so the
//! point-to-segment projection treats each segment as flat: longitudes are scaled by
//! the cosine of the segment's mean latitude (equirectangular projection) and the
//! projection parameter is clamped to the segment. Segments crossing the antimeridian
//! or reaching the poles are not supported.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, TrackPoint};

/// Mean earth radius in kilometers (same value `geo` uses for haversine).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Kilometers per degree of latitude on the haversine sphere.
const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points, in kilometers.
///
/// # Example
///
/// ```rust
/// use alongtrack::{TrackPoint, geo_utils};
///
/// let london = TrackPoint::new(51.5074, -0.1278);
/// let paris = TrackPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_km(&london, &paris);
/// assert!((distance - 343.5).abs() < 1.0);
/// ```
#[inline]
pub fn haversine_km(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2) / 1000.0
}

/// Total length of a polyline in kilometers. Empty or single-point input returns 0.0.
pub fn polyline_length_km(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_km(&w[0], &w[1]))
        .sum()
}

/// Convert kilometers to approximate degrees at a given latitude.
///
/// Uses the longitude scale (`cos(latitude)`) so the value is never smaller than the
/// latitude-degree equivalent, which makes it safe for square search boxes.
/// Close to the poles the cosine is clamped to 0.1.
#[inline]
pub fn km_to_degrees(km: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let km_per_degree = KM_PER_DEGREE * lat_rad.cos().max(0.1);
    km / km_per_degree
}

// =============================================================================
// Segment Geometry
// =============================================================================

/// Nearest approach of a point to a single track segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Distance from the point to the closest location on the segment (km)
    pub distance_km: f64,
    /// Position of that location along the segment, clamped to [0, 1]
    pub t: f64,
    /// Cumulative track distance at that location (km)
    pub along_km: f64,
}

/// Project `point` onto the segment `seg_start -> seg_end`.
///
/// `start_km` and `end_km` are the cumulative track distances at the two segment
/// endpoints; the returned `along_km` interpolates between them and is exactly
/// `end_km` when the projection clamps to the segment end.
///
/// The segment is flattened with an equirectangular projection centered on its mean
/// latitude. `t` is clamped to [0, 1], so points beyond an endpoint measure to that
/// endpoint. A zero-length segment yields `t = 0`.
pub fn project_point_to_segment(
    point: &TrackPoint,
    seg_start: &TrackPoint,
    seg_end: &TrackPoint,
    start_km: f64,
    end_km: f64,
) -> SegmentProjection {
    let ref_lat = ((seg_start.latitude + seg_end.latitude) / 2.0).to_radians();
    let kx = KM_PER_DEGREE * ref_lat.cos();
    let ky = KM_PER_DEGREE;

    // Local frame with seg_start at the origin
    let bx = (seg_end.longitude - seg_start.longitude) * kx;
    let by = (seg_end.latitude - seg_start.latitude) * ky;
    let px = (point.longitude - seg_start.longitude) * kx;
    let py = (point.latitude - seg_start.latitude) * ky;

    let len_sq = bx * bx + by * by;
    let t = if len_sq > 0.0 {
        ((px * bx + py * by) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let dx = px - t * bx;
    let dy = py - t * by;

    let along_km = if t >= 1.0 {
        end_km
    } else {
        start_km + t * (end_km - start_km)
    };

    SegmentProjection {
        distance_km: (dx * dx + dy * dy).sqrt(),
        t,
        along_km,
    }
}

/// Point at fraction `ratio` of the way from `a` to `b` (linear in lat/lon).
#[inline]
pub fn interpolate(a: &TrackPoint, b: &TrackPoint, ratio: f64) -> TrackPoint {
    TrackPoint::new(
        a.latitude + ratio * (b.latitude - a.latitude),
        a.longitude + ratio * (b.longitude - a.longitude),
    )
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of points.
///
/// For empty input, returns bounds with MIN/MAX values that fail any overlap check.
pub fn compute_bounds(points: &[TrackPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Unit Tests
// =============================================================================

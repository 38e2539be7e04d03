//! Utility functions for spherical geometry on WGS84 coordinates
//!
//! Points are `geo::Point<f64>` with x = longitude and y = latitude, both in degrees.

use geo::{Haversine, InterpolatePoint, Point};

/// Earth's mean radius in meters, used to convert between meters and angular distances
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Build a point from latitude and longitude in degrees
#[inline(always)]
pub fn lat_lng(lat: f64, lng: f64) -> Point<f64> {
    Point::new(lng, lat)
}

/// Great-circle angle between two points in radians (haversine formula)
///
/// # Arguments
/// * `p1` - First point (lon, lat) in degrees
/// * `p2` - Second point (lon, lat) in degrees
///
/// # Returns
/// The central angle in radians, in the range [0, π]
#[inline]
pub fn central_angle(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let delta_lat = (p2.y() - p1.y()).to_radians();
    let delta_lon = (p2.x() - p1.x()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
}

/// Point at `ratio` of the great-circle arc from `start` to `end`
///
/// Ratios of exactly 0 and 1 return the endpoints untouched.
#[inline]
pub fn great_circle_interpolate(start: Point<f64>, end: Point<f64>, ratio: f64) -> Point<f64> {
    if ratio <= 0.0 {
        return start;
    }
    if ratio >= 1.0 {
        return end;
    }
    Haversine.point_at_ratio_between(start, end, ratio)
}

/// Check whether two points are within `tolerance` radians of arc of each other
#[inline]
pub fn approx_eq(p1: Point<f64>, p2: Point<f64>, tolerance: f64) -> bool {
    central_angle(p1, p2) <= tolerance
}

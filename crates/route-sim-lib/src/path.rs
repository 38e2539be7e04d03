//! Path storage and loading module
//!
//! This module provides the `Path` struct: an immutable polyline of geographic points
//! with precomputed cumulative angular lengths, used by walkers to turn a normalized
//! fraction into a position.

use crate::{Result, SimError, utils};
use geo::Point;
use std::f64::consts::PI;
use std::path::Path as FsPath;

/// Radians of arc below a half turn at which a segment counts as antipodal
const ANTIPODAL_TOLERANCE: f64 = 1e-9;

/// An ordered polyline of geographic points with a precomputed angular length
#[derive(Clone, Debug)]
pub struct Path {
    /// Vertices in travel order, x = longitude, y = latitude (degrees)
    points: Vec<Point<f64>>,
    /// Cumulative angular length at each vertex (radians); starts at 0, ends at `length`
    cumulative: Vec<f64>,
    /// Total angular length in radians
    length: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Path {
    /// Create a new path from its vertices
    ///
    /// # Arguments
    /// * `points` - At least two points, x = longitude and y = latitude in degrees
    ///
    /// # Returns
    /// The path on success, or `InvalidGeometry` if there are fewer than two points,
    /// a coordinate is out of range, two consecutive points are antipodal, or every point
    /// is identical
    pub fn new(points: Vec<Point<f64>>) -> Result<Self> {
        if points.len() < 2 {
            return Err(SimError::InvalidGeometry(format!(
                "a path needs at least 2 points, got {}",
                points.len()
            )));
        }

        if let Some(bad) = points.iter().find(|p| !is_valid_coordinate(p)) {
            return Err(SimError::InvalidGeometry(format!(
                "coordinate out of range: ({}, {})",
                bad.y(),
                bad.x()
            )));
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut length = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            let segment = utils::central_angle(pair[0], pair[1]);
            // No unique great circle joins antipodal points
            if segment >= PI - ANTIPODAL_TOLERANCE {
                return Err(SimError::InvalidGeometry(format!(
                    "consecutive points ({}, {}) and ({}, {}) are antipodal",
                    pair[0].y(),
                    pair[0].x(),
                    pair[1].y(),
                    pair[1].x()
                )));
            }
            length += segment;
            cumulative.push(length);
        }

        if length <= 0.0 {
            return Err(SimError::InvalidGeometry(
                "path has zero length".to_string(),
            ));
        }

        Ok(Path {
            points,
            cumulative,
            length,
        })
    }

    /// Build a path from parsed GPX data
    ///
    /// Uses the first track (all of its segments, in order). Documents without tracks fall
    /// back to their first route. Points outside the valid coordinate range are skipped.
    pub fn from_gpx(gpx: &gpx::Gpx) -> Result<Self> {
        let waypoints: Vec<&gpx::Waypoint> = if let Some(track) = gpx.tracks.first() {
            track
                .segments
                .iter()
                .flat_map(|segment| segment.points.iter())
                .collect()
        } else if let Some(route) = gpx.routes.first() {
            route.points.iter().collect()
        } else {
            return Err(SimError::InvalidGeometry(
                "GPX document has no track or route".to_string(),
            ));
        };

        let mut points = Vec::with_capacity(waypoints.len());
        for waypoint in waypoints {
            let point = waypoint.point();
            if !is_valid_coordinate(&point) {
                tracing::warn!(
                    "Skipping point outside valid coordinates: ({}, {})",
                    point.y(),
                    point.x()
                );
                continue;
            }
            points.push(point);
        }

        Self::new(points)
    }

    /// Load a path from a GPX file
    pub fn load(file: impl AsRef<FsPath>) -> Result<Self> {
        let file = std::fs::File::open(file.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let gpx = gpx::read(reader)?;
        Self::from_gpx(&gpx)
    }

    /// Total angular length in radians
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Total length in meters on a sphere of radius [`utils::EARTH_RADIUS_METERS`]
    #[inline]
    pub fn length_meters(&self) -> f64 {
        self.length * utils::EARTH_RADIUS_METERS
    }

    #[inline]
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    #[inline]
    pub fn first(&self) -> Point<f64> {
        self.points[0]
    }

    #[inline]
    pub fn last(&self) -> Point<f64> {
        self.points[self.points.len() - 1]
    }

    /// Point at `fraction` of the path's length
    ///
    /// The fraction is mapped onto segments proportionally to their angular lengths, then
    /// interpolated along the great circle of the bounding segment. Values outside [0, 1]
    /// are clamped; 0 and 1 return the first and last points exactly.
    pub fn interpolate(&self, fraction: f64) -> Point<f64> {
        if fraction.is_nan() || fraction <= 0.0 {
            return self.first();
        }
        if fraction >= 1.0 {
            return self.last();
        }

        let target = fraction * self.length;
        // First vertex strictly past the target. Zero-length segments are skipped.
        let end = self.cumulative.partition_point(|&c| c <= target);
        if end >= self.points.len() {
            return self.last();
        }

        let start = end - 1;
        let segment_length = self.cumulative[end] - self.cumulative[start];
        let ratio = (target - self.cumulative[start]) / segment_length;
        utils::great_circle_interpolate(self.points[start], self.points[end], ratio)
    }
}

#[inline]
fn is_valid_coordinate(point: &Point<f64>) -> bool {
    point.x().is_finite()
        && point.y().is_finite()
        && (-90.0..=90.0).contains(&point.y())
        && (-180.0..=180.0).contains(&point.x())
}

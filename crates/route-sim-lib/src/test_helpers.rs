//! Shared fixtures for unit tests

use crate::{Device, DeviceInfo, Metadata, Position};
use geo::Point;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

/// Device that reports a scripted list of points, one per sample
///
/// Once the script is exhausted the last point is repeated.
pub struct ScriptedDevice {
    info: Arc<DeviceInfo>,
    points: VecDeque<Point<f64>>,
    last: Point<f64>,
    samples: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    pub fn new(id: &str, points: Vec<Point<f64>>) -> Self {
        let last = points.last().copied().unwrap_or_else(|| Point::new(0.0, 0.0));
        Self {
            info: Arc::new(DeviceInfo::new(id, Metadata::new())),
            points: points.into(),
            last,
            samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of `current_position` calls, readable after the device is moved away
    pub fn sample_counter(&self) -> Arc<AtomicUsize> {
        self.samples.clone()
    }
}

impl Device for ScriptedDevice {
    fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    fn current_position(&mut self) -> Position {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let point = self.points.pop_front().unwrap_or(self.last);
        Position {
            point,
            at: SystemTime::now(),
            device: self.info.clone(),
        }
    }
}

/// Points along the equator at longitudes 0, 1, 2, ...
pub fn equator_points(n: usize) -> Vec<Point<f64>> {
    (0..n).map(|i| Point::new(i as f64, 0.0)).collect()
}

/// A position for `id` at the given point, sampled now
pub fn position(id: &str, point: Point<f64>) -> Position {
    Position {
        point,
        at: SystemTime::now(),
        device: Arc::new(DeviceInfo::new(id, Metadata::new())),
    }
}

/// Write a single-track GPX file with the given `(lat, lon)` points, returning its path
pub fn write_gpx(dir: &std::path::Path, name: &str, points: &[(f64, f64)]) -> std::path::PathBuf {
    let trkpts: String = points
        .iter()
        .map(|(lat, lon)| format!("      <trkpt lat=\"{lat}\" lon=\"{lon}\"></trkpt>\n"))
        .collect();
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gpx version=\"1.1\" creator=\"route-sim-tests\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n\
         \x20 <trk>\n\
         \x20   <name>{name}</name>\n\
         \x20   <trkseg>\n\
         {trkpts}\
         \x20   </trkseg>\n\
         \x20 </trk>\n\
         </gpx>\n"
    );
    let path = dir.join(name);
    std::fs::write(&path, document).unwrap();
    path
}

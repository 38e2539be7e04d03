//! Simulated devices and the positions they report

use crate::{Clock, Distance, LineWalker, Result, SimError};
use geo::Point;
use std::sync::Arc;
use std::time::SystemTime;

/// Free-form attributes attached to a device, copied into every published position
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Identity of a device, shared by every position it produces
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    id: String,
    metadata: Metadata,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A sampled position: where a device was, and when
#[derive(Clone, Debug)]
pub struct Position {
    /// x = longitude, y = latitude (degrees)
    pub point: Point<f64>,
    /// Wall-clock sampling time
    pub at: SystemTime,
    pub device: Arc<DeviceInfo>,
}

impl Position {
    #[inline]
    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    #[inline]
    pub fn lng(&self) -> f64 {
        self.point.x()
    }

    #[inline]
    pub fn device_id(&self) -> &str {
        self.device.id()
    }
}

/// Anything that can report its current position
///
/// Sampling takes `&mut self`: a device is driven by exactly one caller at a time.
pub trait Device: Send {
    fn info(&self) -> &Arc<DeviceInfo>;

    fn current_position(&mut self) -> Position;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn info(&self) -> &Arc<DeviceInfo> {
        (**self).info()
    }

    fn current_position(&mut self) -> Position {
        (**self).current_position()
    }
}

/// A device moving along a path at constant velocity
///
/// Every sample converts the wall-clock time elapsed since the previous sample into a
/// travel distance and walks it. The first sample measures from construction time.
pub struct SimulatedDevice<W = Box<dyn LineWalker>> {
    info: Arc<DeviceInfo>,
    walker: W,
    /// Meters per second
    velocity: f64,
    clock: Arc<dyn Clock>,
    last_sample: SystemTime,
}

impl<W: LineWalker> SimulatedDevice<W> {
    /// Create a new simulated device
    ///
    /// # Arguments
    /// * `info` - Identity and metadata of the device
    /// * `velocity` - Constant speed in meters per second (finite, non-negative)
    /// * `walker` - Cursor over the device's path
    /// * `clock` - Time source; its current time becomes the first reference sample
    pub fn new(
        info: DeviceInfo,
        velocity: f64,
        walker: W,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if !velocity.is_finite() || velocity < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "device '{}': velocity must be a non-negative number of m/s, got {velocity}",
                info.id()
            )));
        }

        let last_sample = clock.now();
        Ok(Self {
            info: Arc::new(info),
            walker,
            velocity,
            clock,
            last_sample,
        })
    }

    #[inline]
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Put the device back at the start of its path
    pub fn reset(&mut self) {
        self.walker.reset();
    }
}

impl<W: LineWalker> Device for SimulatedDevice<W> {
    fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    fn current_position(&mut self) -> Position {
        let now = self.clock.now();
        // A clock going backwards yields no movement
        let elapsed = now
            .duration_since(self.last_sample)
            .unwrap_or_default()
            .as_secs_f64();
        self.last_sample = now;

        let distance = Distance::from_meters(elapsed * self.velocity);
        let (point, crossed_edge) = self.walker.walk(distance);
        if crossed_edge {
            tracing::debug!(device = %self.info.id(), "Device crossed a path end");
        }

        Position {
            point,
            at: now,
            device: self.info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use crate::utils::lat_lng;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Walker that records requested distances and replays scripted points
    struct RecordingWalker {
        calls: Arc<Mutex<Vec<Distance>>>,
        replies: VecDeque<Point<f64>>,
    }

    impl LineWalker for RecordingWalker {
        fn walk(&mut self, distance: Distance) -> (Point<f64>, bool) {
            self.calls.lock().unwrap().push(distance);
            (self.replies.pop_front().unwrap(), false)
        }

        fn reset(&mut self) {}
    }

    fn recording_device(
        velocity: f64,
        replies: Vec<Point<f64>>,
        clock: &ManualClock,
    ) -> (SimulatedDevice<RecordingWalker>, Arc<Mutex<Vec<Distance>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let walker = RecordingWalker {
            calls: calls.clone(),
            replies: replies.into(),
        };
        let device = SimulatedDevice::new(
            DeviceInfo::new("123", Metadata::new()),
            velocity,
            walker,
            Arc::new(clock.clone()),
        )
        .unwrap();
        (device, calls)
    }

    #[test]
    fn test_elapsed_time_becomes_distance() {
        let clock = ManualClock::default();
        let (mut device, calls) = recording_device(
            10.0,
            vec![lat_lng(45.0, 45.0), lat_lng(90.0, 0.0)],
            &clock,
        );
        assert_eq!(device.info().id(), "123");

        clock.advance(Duration::from_secs(5));
        let first = device.current_position();
        assert_eq!(first.point, lat_lng(45.0, 45.0));
        assert_eq!(first.at, SystemTime::UNIX_EPOCH + Duration::from_secs(5));

        clock.advance(Duration::from_secs(3));
        let second = device.current_position();
        assert_eq!(second.point, lat_lng(90.0, 0.0));
        assert_eq!(second.device_id(), "123");

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Distance::from_meters(50.0), Distance::from_meters(30.0)]
        );
    }

    #[test]
    fn test_clock_going_backwards_does_not_move() {
        let clock = ManualClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(60));
        let (mut device, calls) = recording_device(10.0, vec![lat_lng(0.0, 0.0)], &clock);

        clock.set(SystemTime::UNIX_EPOCH);
        device.current_position();
        assert_eq!(*calls.lock().unwrap(), vec![Distance::ZERO]);
    }

    #[test]
    fn test_invalid_velocity_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        for velocity in [-1.0, f64::NAN, f64::INFINITY] {
            let walker = RecordingWalker {
                calls: Arc::default(),
                replies: VecDeque::new(),
            };
            let result = SimulatedDevice::new(
                DeviceInfo::new("bad", Metadata::new()),
                velocity,
                walker,
                clock.clone(),
            );
            assert!(matches!(result, Err(SimError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_reset_returns_to_path_start() {
        let clock = ManualClock::default();
        let path = Arc::new(
            crate::Path::new(vec![lat_lng(0.0, 0.0), lat_lng(0.0, 1.0)]).unwrap(),
        );
        let mut device = SimulatedDevice::new(
            DeviceInfo::new("shuttle", Metadata::new()),
            20.0,
            crate::LoopMode::BackAndForth.walker(path.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap();
        assert_eq!(device.velocity(), 20.0);

        clock.advance(Duration::from_secs(60));
        let moved = device.current_position();
        assert!(moved.lng() > 0.0);

        device.reset();
        // No time has passed since the last sample, so the device stays at the start
        let restarted = device.current_position();
        assert!(crate::utils::approx_eq(restarted.point, path.first(), 1e-12));
    }

    #[test]
    fn test_positions_share_device_info() {
        let clock = ManualClock::default();
        let mut metadata = Metadata::new();
        metadata.insert("line".to_string(), serde_json::json!("42"));

        let path = Arc::new(
            crate::Path::new(vec![lat_lng(0.0, 0.0), lat_lng(0.0, 1.0)]).unwrap(),
        );
        let mut device = SimulatedDevice::new(
            DeviceInfo::new("bus", metadata),
            5.0,
            crate::LoopMode::Restart.walker(path),
            Arc::new(clock.clone()),
        )
        .unwrap();

        let a = device.current_position();
        clock.advance(Duration::from_secs(1));
        let b = device.current_position();
        assert!(Arc::ptr_eq(&a.device, &b.device));
        assert_eq!(b.device.metadata()["line"], "42");
        assert!(b.lng() > a.lng());
    }
}

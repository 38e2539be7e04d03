//! Line walkers: cursors that advance along a [`Path`] by angular distances
//!
//! Two looping policies are provided:
//!
//! - [`RestartWalker`] jumps back to the start after reaching the end
//! - [`BackAndForthWalker`] turns around at each end of the path
//!
//! Both fold their cursor with Euclidean remainders, so a single step that laps the path
//! several times still lands where continuous motion would have.

use crate::{Distance, Path, SimError};
use geo::Point;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A stateful cursor over a path
pub trait LineWalker: Send {
    /// Advance by `distance` and return the reached point, plus whether one of the path
    /// ends was crossed during this step
    fn walk(&mut self, distance: Distance) -> (Point<f64>, bool);

    /// Move the cursor back to the start of the path
    fn reset(&mut self);
}

impl<W: LineWalker + ?Sized> LineWalker for Box<W> {
    fn walk(&mut self, distance: Distance) -> (Point<f64>, bool) {
        (**self).walk(distance)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Walks the path start to end, then restarts from the start
///
/// The cursor lives in [0, 1). Reaching the end exactly counts as crossing it and puts the
/// walker back on the first point.
#[derive(Clone, Debug)]
pub struct RestartWalker {
    path: Arc<Path>,
    cursor: f64,
}

impl RestartWalker {
    pub fn new(path: Arc<Path>) -> Self {
        Self { path, cursor: 0.0 }
    }

    /// Current normalized position in [0, 1)
    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}

impl LineWalker for RestartWalker {
    fn walk(&mut self, distance: Distance) -> (Point<f64>, bool) {
        let raw = self.cursor + distance.radians() / self.path.length();
        let crossed_edge = raw >= 1.0;
        self.cursor = raw.rem_euclid(1.0);
        (self.path.interpolate(self.cursor), crossed_edge)
    }

    fn reset(&mut self) {
        self.cursor = 0.0;
    }
}

/// Walks the path start to end, then back to the start, and so on
///
/// The cursor lives in [0, 2): [0, 1) is the outbound leg and [1, 2) the return leg,
/// mapped back onto the path as `2 - cursor`. Arriving exactly at the far end is not a
/// crossing; leaving it is. Reaching the start again always is.
#[derive(Clone, Debug)]
pub struct BackAndForthWalker {
    path: Arc<Path>,
    cursor: f64,
}

impl BackAndForthWalker {
    pub fn new(path: Arc<Path>) -> Self {
        Self { path, cursor: 0.0 }
    }

    /// Current normalized position in [0, 2)
    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}

impl LineWalker for BackAndForthWalker {
    fn walk(&mut self, distance: Distance) -> (Point<f64>, bool) {
        let raw = self.cursor + distance.radians() / self.path.length();
        let crossed_edge = (self.cursor <= 1.0 && raw > 1.0) || raw >= 2.0;
        self.cursor = raw.rem_euclid(2.0);

        let point = if self.cursor >= 1.0 {
            self.path.interpolate(2.0 - self.cursor)
        } else {
            self.path.interpolate(self.cursor)
        };
        (point, crossed_edge)
    }

    fn reset(&mut self) {
        self.cursor = 0.0;
    }
}

/// Behavior of a walker when it reaches the end of its path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Restart,
    BackAndForth,
}

impl LoopMode {
    /// Build a walker with this policy over `path`
    pub fn walker(self, path: Arc<Path>) -> Box<dyn LineWalker> {
        match self {
            LoopMode::Restart => Box::new(RestartWalker::new(path)),
            LoopMode::BackAndForth => Box::new(BackAndForthWalker::new(path)),
        }
    }
}

impl FromStr for LoopMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "restart" => Ok(LoopMode::Restart),
            "backandforth" => Ok(LoopMode::BackAndForth),
            _ => Err(SimError::InvalidConfig(format!("unknown loop mode '{s}'"))),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Restart => write!(f, "restart"),
            LoopMode::BackAndForth => write!(f, "back-and-forth"),
        }
    }
}

impl<'de> Deserialize<'de> for LoopMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{EARTH_RADIUS_METERS, approx_eq, lat_lng};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const TOLERANCE: f64 = 1e-9;

    /// Half-moon path over the north pole: (0,-90) -> (90,0) -> (0,90), length π
    fn half_moon() -> Arc<Path> {
        Arc::new(
            Path::new(vec![
                lat_lng(0.0, -90.0),
                lat_lng(90.0, 0.0),
                lat_lng(0.0, 90.0),
            ])
            .unwrap(),
        )
    }

    fn assert_walk(
        walker: &mut dyn LineWalker,
        distance: Distance,
        expected: Point<f64>,
        expected_crossed: bool,
    ) {
        let (point, crossed) = walker.walk(distance);
        assert!(
            approx_eq(point, expected, TOLERANCE),
            "expected {expected:?}, got {point:?}"
        );
        assert_eq!(crossed, expected_crossed, "crossed edge mismatch at {point:?}");
    }

    #[test]
    fn test_restart_walker_half_moon() {
        let mut walker = RestartWalker::new(half_moon());
        assert_walk(
            &mut walker,
            Distance::from_radians(FRAC_PI_4),
            lat_lng(45.0, -90.0),
            false,
        );
        assert_walk(
            &mut walker,
            Distance::from_radians(FRAC_PI_4),
            lat_lng(90.0, 0.0),
            false,
        );
        assert_walk(
            &mut walker,
            Distance::from_radians(PI),
            lat_lng(90.0, 0.0),
            true,
        );
    }

    #[test]
    fn test_restart_walker_meters() {
        let mut walker = RestartWalker::new(half_moon());
        assert_walk(
            &mut walker,
            Distance::from_meters(EARTH_RADIUS_METERS * FRAC_PI_4),
            lat_lng(45.0, -90.0),
            false,
        );
    }

    #[test]
    fn test_restart_walker_full_length_crosses_once() {
        let path = half_moon();
        let quarter = Distance::from_radians(path.length() / 4.0);
        let mut walker = RestartWalker::new(path.clone());

        let crossings: Vec<bool> = (0..4).map(|_| walker.walk(quarter).1).collect();
        assert_eq!(crossings, vec![false, false, false, true]);

        // Back on the start point
        assert_eq!(walker.cursor(), 0.0);
        assert_eq!(walker.walk(Distance::ZERO).0, path.first());
    }

    #[test]
    fn test_restart_walker_multi_lap_step() {
        let path = half_moon();
        let mut walker = RestartWalker::new(path.clone());

        // 3.25 laps in a single step
        let (point, crossed) = walker.walk(Distance::from_radians(path.length() * 3.25));
        assert!(crossed);
        assert!((walker.cursor() - 0.25).abs() < 1e-12);
        assert!(approx_eq(point, lat_lng(45.0, -90.0), TOLERANCE));
    }

    #[test]
    fn test_back_and_forth_walker_half_moon() {
        let mut walker = BackAndForthWalker::new(half_moon());
        assert_walk(
            &mut walker,
            Distance::from_radians(FRAC_PI_2),
            lat_lng(90.0, 0.0),
            false,
        );
        assert_walk(
            &mut walker,
            Distance::from_radians(FRAC_PI_4),
            lat_lng(45.0, 90.0),
            false,
        );
        assert_walk(
            &mut walker,
            Distance::from_radians(FRAC_PI_2),
            lat_lng(45.0, 90.0),
            true,
        );
    }

    #[test]
    fn test_back_and_forth_half_steps() {
        let path = half_moon();
        let half = Distance::from_radians(path.length() / 2.0);
        let mut walker = BackAndForthWalker::new(path.clone());

        // Two halves reach the far end without crossing it
        assert_walk(&mut walker, half, lat_lng(90.0, 0.0), false);
        assert_walk(&mut walker, half, path.last(), false);

        // Leaving the far end is a crossing, and lands back on the midpoint
        assert_walk(&mut walker, half, lat_lng(90.0, 0.0), true);

        // Reaching the start again is a crossing too
        assert_walk(&mut walker, half, path.first(), true);
        assert_eq!(walker.cursor(), 0.0);
    }

    #[test]
    fn test_back_and_forth_multi_lap_step() {
        let path = half_moon();
        let mut walker = BackAndForthWalker::new(path.clone());

        // 2 full round trips plus 1.5 legs: on the return leg, at the midpoint
        let (point, crossed) = walker.walk(Distance::from_radians(path.length() * 5.5));
        assert!(crossed);
        assert!((walker.cursor() - 1.5).abs() < 1e-12);
        assert!(approx_eq(point, lat_lng(90.0, 0.0), TOLERANCE));
    }

    #[test]
    fn test_back_and_forth_exact_round_trip() {
        let path = half_moon();
        let mut walker = BackAndForthWalker::new(path.clone());

        let (point, crossed) = walker.walk(Distance::from_radians(path.length() * 2.0));
        assert!(crossed);
        assert_eq!(point, path.first());
    }

    #[test]
    fn test_walk_zero_never_crosses() {
        let path = half_moon();
        let half = Distance::from_radians(path.length() / 2.0);

        let mut restart = RestartWalker::new(path.clone());
        assert_eq!(restart.walk(Distance::ZERO), (path.first(), false));
        let (before, _) = restart.walk(half);
        assert_eq!(restart.walk(Distance::ZERO), (before, false));

        let mut back_and_forth = BackAndForthWalker::new(path.clone());
        back_and_forth.walk(half);
        back_and_forth.walk(half);
        // Sitting exactly on the far end
        assert_eq!(back_and_forth.walk(Distance::ZERO), (path.last(), false));
    }

    #[test]
    fn test_reset() {
        let path = half_moon();
        let mut walker = BackAndForthWalker::new(path.clone());
        walker.walk(Distance::from_radians(path.length() * 1.5));
        walker.reset();
        assert_eq!(walker.cursor(), 0.0);
        assert_eq!(walker.walk(Distance::ZERO), (path.first(), false));

        let mut walker = RestartWalker::new(path.clone());
        walker.walk(Distance::from_radians(path.length() * 0.5));
        walker.reset();
        assert_eq!(walker.cursor(), 0.0);
    }

    #[test]
    fn test_loop_mode_parsing() {
        assert_eq!("Restart".parse::<LoopMode>().unwrap(), LoopMode::Restart);
        assert_eq!(
            "BackAndForth".parse::<LoopMode>().unwrap(),
            LoopMode::BackAndForth
        );
        assert_eq!(
            "back-and-forth".parse::<LoopMode>().unwrap(),
            LoopMode::BackAndForth
        );
        assert_eq!(
            "back_and_forth".parse::<LoopMode>().unwrap(),
            LoopMode::BackAndForth
        );
        assert!(matches!(
            "zigzag".parse::<LoopMode>(),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_loop_mode_deserialize() {
        let mode: LoopMode = serde_json::from_str("\"backandforth\"").unwrap();
        assert_eq!(mode, LoopMode::BackAndForth);
        assert!(serde_json::from_str::<LoopMode>("\"sideways\"").is_err());
    }

    #[test]
    fn test_loop_mode_builds_walker() {
        let path = half_moon();
        let mut walker = LoopMode::BackAndForth.walker(path.clone());
        let (point, crossed) = walker.walk(Distance::from_radians(path.length() * 1.5));
        assert!(crossed);
        assert!(approx_eq(point, lat_lng(90.0, 0.0), TOLERANCE));
    }
}

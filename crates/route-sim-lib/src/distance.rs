//! Angular travel distances

use crate::utils::EARTH_RADIUS_METERS;
use std::fmt;
use std::ops::Add;

/// A travel distance expressed as an angle (fraction of Earth's radius)
///
/// Angular distances compose directly with [`Path::length`](crate::Path::length), so
/// walkers never need to know the Earth's radius. Always non-negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Distance(f64);

impl Distance {
    pub const ZERO: Distance = Distance(0.0);

    /// Convert a distance in meters; negative or non-finite inputs become zero
    #[inline]
    pub fn from_meters(meters: f64) -> Self {
        Self::from_radians(meters / EARTH_RADIUS_METERS)
    }

    /// Wrap an angle in radians; negative or non-finite inputs become zero
    #[inline]
    pub fn from_radians(radians: f64) -> Self {
        if radians.is_finite() && radians > 0.0 {
            Distance(radians)
        } else {
            Distance(0.0)
        }
    }

    #[inline]
    pub fn radians(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn meters(self) -> f64 {
        self.0 * EARTH_RADIUS_METERS
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl Add for Distance {
    type Output = Distance;

    fn add(self, rhs: Distance) -> Distance {
        Distance(self.0 + rhs.0)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} m", self.meters())
    }
}

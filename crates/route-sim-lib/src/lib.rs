//! Route Simulator Library - Simulated GPS Devices and Live Position Fan-out
//!
//! This library simulates GPS-like devices that travel along predefined routes at a
//! constant velocity, samples their positions at a fixed cadence, and hands every sample
//! to a publisher (a log, an NDJSON stream, or a WebSocket broadcast server).
//!
//! # Architecture
//!
//! - **[`Path`]**: Immutable polyline with precomputed angular length
//! - **[`LineWalker`]**: Cursor over a path, with [`RestartWalker`] and [`BackAndForthWalker`] policies
//! - **[`SimulatedDevice`]**: Turns wall-clock elapsed time into travel distance
//! - **[`PositionSource`]**: Periodic emitter with a single-slot handoff channel
//! - **[`Dispatcher`]**: Round-robin fan-in from sources into one publisher, fail-fast
//! - **[`FanoutPublisher`]**: WebSocket broadcast server with per-subscriber queues
//!
//! # Data Flow
//!
//! `Path → LineWalker → SimulatedDevice → PositionSource → Dispatcher → PositionPublisher`

mod clock;
pub mod config;
mod device;
mod dispatcher;
mod distance;
mod path;
pub mod publisher;
mod simulation;
mod source;
#[cfg(test)]
mod test_helpers;
pub mod utils;
mod walker;

// Public API exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeviceConfig, PublisherConfig, SimulationConfig};
pub use device::{Device, DeviceInfo, Metadata, Position, SimulatedDevice};
pub use dispatcher::{DispatchError, DispatchStats, Dispatcher};
pub use distance::Distance;
pub use path::Path;
pub use publisher::{
    FanoutConfig, FanoutPublisher, LimitedPublisher, LogPublisher, NdjsonPublisher,
    OverflowPolicy, PositionPublisher, PublishError,
};
pub use simulation::{Simulation, SimulationSummary, load_routes};
pub use source::{PositionSource, TryNext};
pub use walker::{BackAndForthWalker, LineWalker, LoopMode, RestartWalker};

/// Error types for building and running a simulation
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parsing error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to load route for device '{device}': {source}")]
    RouteLoad {
        device: String,
        #[source]
        source: Box<SimError>,
    },

    #[error("Publisher error: {0}")]
    Publisher(#[from] PublishError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that the main entry points are accessible
        let _: fn(Vec<geo::Point<f64>>) -> Result<Path> = Path::new;
        let _: fn(f64) -> Distance = Distance::from_meters;
        let _: fn() -> FanoutConfig = FanoutConfig::default;
    }

    #[test]
    fn test_route_load_error_names_device() {
        let err = SimError::RouteLoad {
            device: "bus-1".to_string(),
            source: Box::new(SimError::InvalidGeometry("too few points".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("bus-1"));
        assert!(message.contains("too few points"));
    }
}

//! Simulation configuration file
//!
//! ```json
//! {
//!   "devices": [
//!     { "id": "bus-1", "route": "routes/line.gpx", "mode": "backandforth",
//!       "period_ms": 1000, "velocity": 12.5, "metadata": { "line": "42" } }
//!   ],
//!   "publisher": { "type": "websocket", "address": "127.0.0.1:8080" },
//!   "limit": 1000
//! }
//! ```

use crate::{FanoutConfig, LoopMode, Metadata, Result, SimError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Stop after publishing this many positions
    #[serde(default)]
    pub limit: Option<u64>,
}

/// One simulated device
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Defaults to `device-<index>`
    #[serde(default)]
    pub id: Option<String>,
    /// GPX file, relative to the configuration file
    pub route: PathBuf,
    #[serde(default)]
    pub mode: LoopMode,
    pub period_ms: u64,
    /// Meters per second
    pub velocity: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Where positions go
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublisherConfig {
    /// Log every position through `tracing`
    Log {
        #[serde(default = "default_log_level")]
        level: String,
    },
    /// Newline-delimited GeoJSON to a file, or stdout when absent or `-`
    Ndjson {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// WebSocket broadcast server
    Websocket(FanoutConfig),
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig::Log {
            level: default_log_level(),
        }
    }
}

impl PublisherConfig {
    /// Short name, as written in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherConfig::Log { .. } => "log",
            PublisherConfig::Ndjson { .. } => "ndjson",
            PublisherConfig::Websocket(_) => "websocket",
        }
    }
}

/// Parse a `tracing` level name such as `info` or `DEBUG`
pub fn parse_level(name: &str) -> Result<Level> {
    name.parse::<Level>()
        .map_err(|_| SimError::InvalidConfig(format!("unknown log level '{name}'")))
}

impl SimulationConfig {
    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(SimError::InvalidConfig(
                "at least one device is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            let id = device.id_or_default(index);
            device.validate(&id)?;
            if !seen.insert(id.clone()) {
                return Err(SimError::InvalidConfig(format!(
                    "device id '{id}' is used more than once"
                )));
            }
        }

        match &self.publisher {
            PublisherConfig::Log { level } => {
                parse_level(level)?;
            }
            PublisherConfig::Ndjson { .. } => {}
            PublisherConfig::Websocket(fanout) => {
                if fanout.address.is_empty() {
                    return Err(SimError::InvalidConfig(
                        "websocket publisher needs an address".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl DeviceConfig {
    /// The configured id, or `device-<index>`
    pub fn id_or_default(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("device-{index}"),
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Route file resolved against the configuration directory
    pub fn route_path(&self, base_dir: &Path) -> PathBuf {
        if self.route.is_absolute() {
            self.route.clone()
        } else {
            base_dir.join(&self.route)
        }
    }

    fn validate(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(SimError::InvalidConfig("device id must not be empty".to_string()));
        }
        if self.period_ms == 0 {
            return Err(SimError::InvalidConfig(format!(
                "device '{id}': period_ms must be greater than zero"
            )));
        }
        if !self.velocity.is_finite() || self.velocity < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "device '{id}': velocity must be a non-negative number of m/s, got {}",
                self.velocity
            )));
        }
        Ok(())
    }
}

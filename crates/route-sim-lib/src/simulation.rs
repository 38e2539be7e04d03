//! Assembling a runnable simulation from a configuration

use crate::config::parse_level;
use crate::{
    DeviceInfo, DispatchError, DispatchStats, Dispatcher, FanoutPublisher, LimitedPublisher,
    LogPublisher, NdjsonPublisher, Path, PositionPublisher, PositionSource, PublishError,
    PublisherConfig, Result, SimError, SimulatedDevice, SimulationConfig, SystemClock,
};
use rayon::prelude::*;
use std::fmt;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Overview of a configured simulation
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSummary {
    pub devices: usize,
    /// Sum of every device's route length
    pub total_route_meters: f64,
    pub publisher: &'static str,
    pub limit: Option<u64>,
}

impl SimulationSummary {
    /// Summarize `config`, given the routes loaded for its devices
    pub fn new(config: &SimulationConfig, routes: &[Arc<Path>]) -> Self {
        Self {
            devices: config.devices.len(),
            total_route_meters: routes.iter().map(|route| route.length_meters()).sum(),
            publisher: config.publisher.kind(),
            limit: config.limit,
        }
    }
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} device(s), {:.3} km of routes, {} publisher",
            self.devices,
            self.total_route_meters / 1000.0,
            self.publisher
        )?;
        if let Some(limit) = self.limit {
            write!(f, ", stopping after {limit} positions")?;
        }
        Ok(())
    }
}

/// Load every device's route in parallel, in device order
///
/// Relative route paths are resolved against `base_dir`.
pub fn load_routes(config: &SimulationConfig, base_dir: &FsPath) -> Result<Vec<Arc<Path>>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("simulation::load_routes");

    config
        .devices
        .par_iter()
        .enumerate()
        .map(|(index, device)| {
            let file = device.route_path(base_dir);
            Path::load(&file)
                .map(Arc::new)
                .map_err(|e| SimError::RouteLoad {
                    device: device.id_or_default(index),
                    source: Box::new(e),
                })
        })
        .collect()
}

/// A fully wired simulation: devices, their sources, and the publisher
pub struct Simulation {
    dispatcher: Dispatcher<Box<dyn PositionPublisher>>,
    summary: SimulationSummary,
}

impl Simulation {
    /// Build every component described by `config`
    ///
    /// The publisher is created first, so a broadcast server is listening before any device
    /// starts sampling. Everything stops when `cancel` is cancelled.
    pub async fn from_config(
        config: &SimulationConfig,
        base_dir: &FsPath,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let routes = load_routes(config, base_dir)?;
        let summary = SimulationSummary::new(config, &routes);

        let publisher = build_publisher(config, base_dir, &cancel).await?;

        let mut sources = Vec::with_capacity(config.devices.len());
        for (index, (device, route)) in config.devices.iter().zip(routes).enumerate() {
            let id = device.id_or_default(index);
            tracing::info!(
                device = %id,
                mode = %device.mode,
                route_meters = route.length_meters(),
                velocity = device.velocity,
                period_ms = device.period_ms,
                "Starting device"
            );

            let simulated = SimulatedDevice::new(
                DeviceInfo::new(id, device.metadata.clone()),
                device.velocity,
                device.mode.walker(route),
                Arc::new(SystemClock),
            )?;
            sources.push(PositionSource::new(
                simulated,
                device.period(),
                cancel.clone(),
            )?);
        }

        Ok(Self {
            dispatcher: Dispatcher::new(sources, publisher, cancel),
            summary,
        })
    }

    pub fn summary(&self) -> &SimulationSummary {
        &self.summary
    }

    /// Dispatch until every source ends, the token is cancelled, the position limit is
    /// reached, or publishing fails; then close the publisher
    pub async fn run(&mut self) -> Result<DispatchStats> {
        let outcome = self.dispatcher.run().await;
        let closed = self.dispatcher.publisher_mut().close().await;

        let stats = match outcome {
            Ok(stats) => stats,
            Err(DispatchError {
                source: PublishError::LimitReached { limit },
                ..
            }) => DispatchStats { published: limit },
            Err(e) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "Failed to close publisher");
                }
                return Err(e.into());
            }
        };
        closed?;
        Ok(stats)
    }
}

async fn build_publisher(
    config: &SimulationConfig,
    base_dir: &FsPath,
    cancel: &CancellationToken,
) -> Result<Box<dyn PositionPublisher>> {
    let publisher: Box<dyn PositionPublisher> = match &config.publisher {
        PublisherConfig::Log { level } => Box::new(LogPublisher::new(parse_level(level)?)),
        PublisherConfig::Ndjson { path } => match path {
            Some(path) if path.as_os_str() != "-" => {
                let file = std::fs::File::create(base_dir.join(path))?;
                Box::new(NdjsonPublisher::new(std::io::BufWriter::new(file)))
            }
            _ => Box::new(NdjsonPublisher::new(std::io::stdout())),
        },
        PublisherConfig::Websocket(fanout) => {
            Box::new(FanoutPublisher::bind(fanout.clone(), cancel.clone()).await?)
        }
    };

    Ok(match config.limit {
        Some(limit) => Box::new(LimitedPublisher::new(publisher, limit)),
        None => publisher,
    })
}

//! Top-level run: load the configuration, build the simulation, dispatch until done

use crate::settings::Settings;
use route_sim_lib::{SimError, Simulation, SimulationConfig, SimulationSummary, load_routes};
use tokio_util::sync::CancellationToken;

/// A failure, tagged with the stage it happened in
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] SimError),

    #[error("Failed to build simulation: {0}")]
    Build(#[source] SimError),

    #[error("Simulation failed: {0}")]
    Run(#[source] SimError),
}

impl AppError {
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Build(_) => "build",
            AppError::Run(_) => "run",
        }
    }
}

/// Run the simulation described by `settings` until it ends or `cancel` fires
///
/// In check mode the routes are loaded and summarized, nothing is started.
pub async fn run(settings: &Settings, cancel: CancellationToken) -> Result<(), AppError> {
    tracing::info!(config = %settings.config.display(), "Loading configuration");
    let config = SimulationConfig::load(&settings.config).map_err(AppError::Config)?;
    let base_dir = settings.base_dir();

    if settings.check {
        let routes = load_routes(&config, &base_dir).map_err(AppError::Build)?;
        let summary = SimulationSummary::new(&config, &routes);
        println!("{}: OK, {summary}", settings.config.display());
        return Ok(());
    }

    let mut simulation = Simulation::from_config(&config, &base_dir, cancel)
        .await
        .map_err(AppError::Build)?;
    tracing::info!(summary = %simulation.summary(), "Simulation started");

    let stats = simulation.run().await.map_err(AppError::Run)?;
    tracing::info!(published = stats.published, "Simulation finished");
    Ok(())
}

use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Route Simulator - Simulated GPS devices walking GPX routes and publishing their positions
pub struct Settings {
    /// Simulation configuration file (JSON)
    #[clap(short, long, value_name = "FILE", default_value = "routesim.json")]
    pub config: PathBuf,

    /// Validate the configuration and load every route, print a summary and exit
    #[clap(long, default_value = "false")]
    pub check: bool,
}

impl Settings {
    /// Parse the process arguments, exiting with usage information on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Directory that relative paths in the configuration are resolved against
    pub fn base_dir(&self) -> PathBuf {
        match self.config.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        }
    }
}

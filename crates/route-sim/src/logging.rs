//! Logging setup for the binary
//!
//! Output goes through a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. With the
//! `profiling` feature, the library's profiling scopes are emitted as tracing spans and show
//! up in the same output.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info";

/// Initialize logging with sensible defaults
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", DEFAULT_FILTER);
        }
    }

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    let registry = tracing_subscriber::registry().with(fmt_layer);
    registry.init();

    #[cfg(feature = "profiling")]
    tracing::info!("Logging initialized (profiling scopes enabled)");
    #[cfg(not(feature = "profiling"))]
    tracing::debug!("Logging initialized");
}

pub fn short_version_info() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub fn log_version_info() {
    tracing::info!("{}", short_version_info());
}

mod logging;
mod run;
mod settings;

use settings::Settings;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();
    logging::log_version_info();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let result = rt.block_on(async {
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, stopping the simulation");
                    cancel.cancel();
                }
            })
        };

        let result = run::run(&settings, cancel.clone()).await;
        interrupt.abort();
        result
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(stage = e.stage(), "{e}");
            ExitCode::FAILURE
        }
    }
}

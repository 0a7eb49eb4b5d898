use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sensorfleet::config::{Settings, load_config};
use sensorfleet::simulator::{Fleet, FleetReport};
use sensorfleet::utils::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log_level);
    if let Err(e) = dotenv {
        debug!("no .env loaded: {e}");
    }

    match run(settings).await {
        Ok(report) if report.is_clean() => ExitCode::SUCCESS,
        Ok(report) => {
            for failure in &report.failures {
                error!(device = %failure.device_id, "{}", failure.error);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<FleetReport> {
    let fleet = Fleet::from_settings(&settings).context("failed to start fleet")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let report = fleet.run(shutdown).await;
    info!(
        devices = report.devices,
        published = report.total_published(),
        failures = report.failures.len(),
        "simulation finished"
    );
    Ok(report)
}

/// Cancels `shutdown` on SIGINT, or SIGTERM on unix.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, stopping devices");
    shutdown.cancel();
}

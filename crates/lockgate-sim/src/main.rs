mod config;
mod run;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let request = config.request();

    info!("Starting lockgate-sim");
    info!("  Backend: {}", config.backend);
    info!("  Request: {}", request);
    info!("  Workers: {} x {} round(s), hold {}ms", config.workers, config.rounds, config.hold_ms);
    if config.no_handle_cache {
        info!("  Handle cache: off");
    }

    if config.workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }

    let coordinator = Arc::new(config.coordinator());
    coordinator.initialize().await?;

    let simulation = run::run(
        Arc::clone(&coordinator),
        request,
        config.workers,
        config.rounds,
        config.hold(),
    );
    let report = tokio::select! {
        report = simulation => report,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            coordinator.destroy().await?;
            return Ok(());
        }
    };

    coordinator.destroy().await?;
    let report = report?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!("Simulation complete in {}ms", report.elapsed_ms);
        info!("  Acquired: {}", report.acquired);
        info!("  Not acquired: {}", report.not_acquired);
        info!("  Failed: {}", report.failed);
        info!("  Peak concurrency: {}", report.peak_concurrency);
    }
    Ok(())
}

use anyhow::{Context, Result};
use tokio::sync::watch;

use voyager::config::Config;
use voyager::coordinator::CoordinatorClient;
use voyager::dispatcher::{Dispatcher, MarkerSet};
use voyager::reporter::Reporter;

/// Flip the returned receiver to `true` on Ctrl+C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to wait for Ctrl+C: {}", e),
        }
        let _ = shutdown.send(true);
    });
    shutdown_rx
}

fn client(config: &Config) -> Result<CoordinatorClient> {
    CoordinatorClient::new(config.client_config()).context("Failed to create coordinator client")
}

/// Poll the coordinator and hand targets to the local crawler
pub async fn dispatch(config: Config) -> Result<()> {
    let markers = MarkerSet::open(&config.dispatcher.marker_dir).with_context(|| {
        format!(
            "Failed to open marker directory: {}",
            config.dispatcher.marker_dir.display()
        )
    })?;

    println!("Starting dispatcher");
    println!("  Coordinator: {}", config.worker.coordinator_url);
    println!("  Marker Dir: {}", config.dispatcher.marker_dir.display());
    println!("  Max Local In-flight: {}", config.dispatcher.max_local_inflight);
    println!("  Relief Time: {}s", config.dispatcher.relief_time_secs);
    println!("Press Ctrl+C to stop.\n");

    let mut dispatcher = Dispatcher::new(client(&config)?, markers, config.dispatcher.clone());
    dispatcher.run(shutdown_on_ctrl_c()).await;

    let stats = dispatcher.stats();
    println!(
        "Dispatcher stopped: {} dispatched, {} empty, {} faults, {} saturated",
        stats.dispatched, stats.empty, stats.faults, stats.saturated
    );
    Ok(())
}

/// Upload spooled results, once or continuously
pub async fn report(config: Config, once: bool) -> Result<()> {
    let markers = MarkerSet::open(&config.dispatcher.marker_dir).with_context(|| {
        format!(
            "Failed to open marker directory: {}",
            config.dispatcher.marker_dir.display()
        )
    })?;
    std::fs::create_dir_all(&config.reporter.spool_dir).with_context(|| {
        format!(
            "Failed to create spool directory: {}",
            config.reporter.spool_dir.display()
        )
    })?;

    let reporter = Reporter::new(client(&config)?, config.reporter.clone()).with_markers(markers);

    if once {
        let summary = reporter.run_once().await?;
        println!(
            "Uploaded {}, invalid {}, failed {}, partial {}",
            summary.uploaded, summary.invalid, summary.failed, summary.partial
        );
        return Ok(());
    }

    println!("Starting reporter");
    println!("  Coordinator: {}", config.worker.coordinator_url);
    println!("  Spool Dir: {}", config.reporter.spool_dir.display());
    println!("  Keep Processed: {}", config.reporter.keep_processed);
    println!("Press Ctrl+C to stop.\n");

    reporter.run(shutdown_on_ctrl_c()).await;
    println!("Reporter stopped.");
    Ok(())
}

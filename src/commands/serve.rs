use anyhow::{Context, Result};
use std::sync::Arc;

use voyager::config::{Config, StorageBackend};
use voyager::coordinator::{CoordinatorServer, Orchestrator};
use voyager::utils::SystemClock;

// ============================================================================
// Coordinator Server Implementation
// ============================================================================

/// Start the coordinator server
pub async fn coordinator_server(config: Config) -> Result<()> {
    let stores = config.storage.open()?;

    println!("Starting Coordinator Server");
    println!("===========================");
    println!("  Storage: {:?}", config.storage.backend);
    if config.storage.backend == StorageBackend::Sqlite {
        println!("  Database: {}", config.storage.sqlite_path.display());
    }
    println!("  Max Claim Attempts: {}", config.frontier.max_claim_attempts);
    println!("  Sample Size: {}", config.frontier.sample_size);
    println!();

    let orchestrator = Arc::new(Orchestrator::new(
        stores,
        Arc::new(SystemClock),
        config.frontier.clone(),
        &config.coordinator,
    ));

    let server = CoordinatorServer::new(config.coordinator.clone(), orchestrator)
        .context("Failed to create coordinator server")?;

    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    println!("  GET  /api/health        - Health check");
    println!("  GET  /metrics           - Prometheus metrics endpoint");
    println!("  GET  /api/next          - Claim the next target");
    println!("  POST /api/discovered    - Report discovered references");
    println!("  POST /api/content       - Report harvested content");
    println!("  POST /api/targets       - Inject targets");
    println!("  GET  /api/targets/{{id}}  - Get one target record");
    println!("  GET  /api/stats         - Get frontier stats");
    println!();
    println!(
        "Coordinator server listening on http://{}",
        config.coordinator.bind_address
    );
    println!("Press Ctrl+C to stop.\n");

    // Start with graceful shutdown
    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("Coordinator server stopped.");
    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voyager::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "voyager",
    version,
    about = "Crawl frontier coordinator and worker dispatcher",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to LOG_FORMAT or text
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file; environment variables are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator HTTP service
    Serve {
        /// Override the bind address (host:port)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Poll the coordinator and write in-flight markers for the local crawler
    Dispatch,

    /// Upload spooled crawl results to the coordinator
    Report {
        /// Process the spool once and exit
        #[arg(long, default_value = "false")]
        once: bool,
    },

    /// Inject targets directly, bypassing the capacity cap
    Inject {
        /// Target ids to inject
        #[arg(required = true)]
        targets: Vec<String>,

        /// Priority for the injected targets
        #[arg(short, long)]
        priority: Option<i64>,
    },

    /// Show frontier statistics from a running coordinator
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    if let Err(e) = voyager::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.coordinator.bind_address = bind
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid bind address '{bind}': {e}"))?;
            }
            config.validate()?;
            tracing::info!(
                bind_address = %config.coordinator.bind_address,
                "Starting serve command"
            );
            commands::coordinator_server(config).await?;
        }

        Commands::Dispatch => {
            config.validate()?;
            tracing::info!(
                coordinator_url = %config.worker.coordinator_url,
                "Starting dispatch command"
            );
            commands::dispatch(config).await?;
        }

        Commands::Report { once } => {
            config.validate()?;
            tracing::info!(once, "Starting report command");
            commands::report(config, once).await?;
        }

        Commands::Inject { targets, priority } => {
            tracing::info!(count = targets.len(), priority = ?priority, "Starting inject command");
            commands::inject(config, targets, priority).await?;
        }

        Commands::Stats => {
            commands::stats(config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => tracing_subscriber::EnvFilter::new(filter),
        Err(_) if verbose => tracing_subscriber::EnvFilter::new("voyager=debug,info"),
        Err(_) => tracing_subscriber::EnvFilter::new(format!("voyager={level},warn")),
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

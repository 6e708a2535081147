//! Coordinator server implementation
//!
//! Wires the orchestration service into an axum router and serves it.
//! While serving, a background task refreshes the per-status record gauges
//! so `/metrics` stays current between `/api/stats` calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::api::create_router;
use super::config::CoordinatorConfig;
use super::service::Orchestrator;

const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
    pub config: CoordinatorConfig,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("failed to bind {addr}: {reason}")]
    BindError { addr: SocketAddr, reason: String },

    #[error("server error: {0}")]
    ServeError(String),
}

/// HTTP front end for an [`Orchestrator`]
pub struct CoordinatorServer {
    state: AppState,
}

impl CoordinatorServer {
    pub fn new(config: CoordinatorConfig, orchestrator: Arc<Orchestrator>) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        if orchestrator.empty_signal() != config.empty_signal {
            return Err(ServerError::ConfigError(format!(
                "orchestrator reserves {:?} but the server would answer {:?}",
                orchestrator.empty_signal(),
                config.empty_signal
            )));
        }

        Ok(Self {
            state: AppState {
                orchestrator,
                started_at: Instant::now(),
                config,
            },
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Router with the configured CORS and request-logging layers applied
    pub fn build_router(&self) -> Router {
        let config = &self.state.config;
        let mut router = create_router(self.state.clone());

        if config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }
        if config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }
        router
    }

    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown_signal` resolves, then drain in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.state.config.bind_address;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError {
                addr,
                reason: e.to_string(),
            })?;

        tracing::info!(
            bind_address = %addr,
            empty_signal = %self.state.config.empty_signal,
            "Coordinator listening"
        );

        let (stop_gauges, stop_gauges_rx) = watch::channel(false);
        let refresher = tokio::spawn(refresh_gauges(
            Arc::clone(&self.state.orchestrator),
            stop_gauges_rx,
        ));

        let served = axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()));

        let _ = stop_gauges.send(true);
        let _ = refresher.await;

        tracing::info!(uptime_secs = self.state.uptime_secs(), "Coordinator stopped");
        served
    }

    pub fn info(&self) -> ServerInfo {
        let config = &self.state.config;
        let frontier = self.state.orchestrator.frontier_config();
        ServerInfo {
            bind_address: config.bind_address,
            empty_signal: config.empty_signal.clone(),
            inject_priority: config.inject_priority,
            min_revisit_interval_secs: frontier.min_revisit_interval_secs,
            max_outstanding: frontier.max_outstanding,
            cors_enabled: config.enable_cors,
            request_logging_enabled: config.enable_request_logging,
        }
    }
}

async fn refresh_gauges(orchestrator: Arc<Orchestrator>, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Frontier::stats updates the gauges as a side effect
                if let Err(e) = orchestrator.stats().await {
                    tracing::warn!(error = %e, "Failed to refresh record gauges");
                }
            }
            _ = stop.changed() => break,
        }
    }
}

/// Startup summary printed by `voyager serve`
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub empty_signal: String,
    pub inject_priority: i64,
    pub min_revisit_interval_secs: u64,
    pub max_outstanding: usize,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    pub fn display(&self) -> String {
        let on_off = |enabled: bool| if enabled { "on" } else { "off" };
        format!(
            "Coordinator Server\n\
             {:-<40}\n\
             Bind Address:     {}\n\
             Empty Signal:     {}\n\
             Inject Priority:  {}\n\
             Revisit After:    {}s\n\
             Max Outstanding:  {}\n\
             CORS / Req. Log:  {} / {}",
            "",
            self.bind_address,
            self.empty_signal,
            self.inject_priority,
            self.min_revisit_interval_secs,
            self.max_outstanding,
            on_off(self.cors_enabled),
            on_off(self.request_logging_enabled),
        )
    }
}

//! REST API handlers for the Coordinator server
//!
//! Routes:
//!
//! ```text
//! GET  /api/health          liveness, version, uptime
//! GET  /api/next            next target, or the wait signal
//! POST /api/discovered      discovery report for a crawled source
//! POST /api/content         content items for a target
//! POST /api/targets         operator injection
//! GET  /api/targets/{id}    one target record
//! GET  /api/stats           record counts and frontier counters
//! GET  /metrics             Prometheus text export
//! ```

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::frontier::FrontierStats;
use crate::metrics;
use crate::models::TargetId;

use super::server::AppState;
use super::service::{
    ContentReport, DiscoveryReport, InjectTarget, NextTarget, ServiceError,
};

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper, shared by server and client
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Wire form of [`NextTarget`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextResponse {
    Target { target_id: TargetId },
    Wait { signal: String },
}

impl NextResponse {
    fn from_next(next: NextTarget, empty_signal: &str) -> Self {
        match next {
            NextTarget::Target(target_id) => Self::Target { target_id },
            NextTarget::Wait => Self::Wait {
                signal: empty_signal.to_string(),
            },
        }
    }
}

/// Operator injection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectRequest {
    pub targets: Vec<InjectTarget>,
}

/// Stats response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub frontier: FrontierStats,
    pub uptime_secs: u64,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/next", get(request_next))
        .route("/api/discovered", post(report_discovered))
        .route("/api/content", post(report_content))
        .route("/api/targets", post(inject_targets))
        .route("/api/targets/{id}", get(get_target))
        .route("/api/stats", get(get_stats))
        .route("/metrics", get(export_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record per-endpoint request counts and latency
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

fn service_error(e: ServiceError) -> Response {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %e, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
    }))
}

async fn request_next(State(state): State<AppState>) -> Response {
    match state.orchestrator.request_next().await {
        Ok(next) => {
            let body = NextResponse::from_next(next, &state.config.empty_signal);
            (StatusCode::OK, Json(ApiResponse::success(body))).into_response()
        }
        Err(e) => service_error(e),
    }
}

async fn report_discovered(
    State(state): State<AppState>,
    Json(report): Json<DiscoveryReport>,
) -> Response {
    match state.orchestrator.report_discovered(report).await {
        Ok(ack) => (StatusCode::OK, Json(ApiResponse::success(ack))).into_response(),
        Err(e) => service_error(e),
    }
}

async fn report_content(
    State(state): State<AppState>,
    Json(report): Json<ContentReport>,
) -> Response {
    match state.orchestrator.report_content(report).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))).into_response(),
        Err(e) => service_error(e),
    }
}

async fn inject_targets(
    State(state): State<AppState>,
    Json(request): Json<InjectRequest>,
) -> Response {
    match state.orchestrator.inject(&request.targets).await {
        Ok(ack) => (StatusCode::OK, Json(ApiResponse::success(ack))).into_response(),
        Err(e) => service_error(e),
    }
}

async fn get_target(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.target(&TargetId::from(id.as_str())).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(format!("Target not found: {}", id))),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

async fn get_stats(State(state): State<AppState>) -> Response {
    match state.orchestrator.stats().await {
        Ok(frontier) => (
            StatusCode::OK,
            Json(ApiResponse::success(StatsResponse {
                frontier,
                uptime_secs: state.uptime_secs(),
            })),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

async fn export_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================

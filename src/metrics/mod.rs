//! Prometheus metrics for the voyager coordinator and workers
//!
//! This module provides metrics tracking for:
//! - Coordinator: next-target requests, claim conflicts, admissions, reports, records by status
//! - Workers: dispatcher backoffs and dispatches, reporter spool outcomes
//! - API request counts and latency as seen by the server
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::storage::StatusCounts;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for coordinator-side metrics
struct FrontierMetrics {
    next_requests: CounterVec,
    claim_conflicts: Counter,
    admissions: CounterVec,
    discovered_reports: Counter,
    content_items: CounterVec,
    records: GaugeVec,
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

/// Container for worker-side metrics
struct WorkerMetrics {
    backoffs: CounterVec,
    dispatched: Counter,
    spool_files: CounterVec,
}

static FRONTIER_METRICS: OnceLock<FrontierMetrics> = OnceLock::new();

static WORKER_METRICS: OnceLock<WorkerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If registration fails, the error is returned
/// and every recording function stays a no-op.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = voyager::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let frontier = FrontierMetrics {
        next_requests: register_counter_vec!(
            "voyager_next_requests_total",
            "Next-target requests by result",
            &["result"]
        )?,
        claim_conflicts: register_counter!(
            "voyager_claim_conflicts_total",
            "Claim attempts lost to a concurrent caller"
        )?,
        admissions: register_counter_vec!(
            "voyager_admissions_total",
            "Discovered candidates by admission outcome",
            &["outcome"]
        )?,
        discovered_reports: register_counter!(
            "voyager_discovered_reports_total",
            "Discovery reports received"
        )?,
        content_items: register_counter_vec!(
            "voyager_content_items_total",
            "Content items written by result",
            &["result"]
        )?,
        records: register_gauge_vec!(
            "voyager_frontier_records",
            "Target records by status",
            &["status"]
        )?,
        api_requests: register_counter_vec!(
            "voyager_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "voyager_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        )?,
    };

    let worker = WorkerMetrics {
        backoffs: register_counter_vec!(
            "voyager_dispatcher_backoffs_total",
            "Dispatcher sleeps by cause",
            &["cause"]
        )?,
        dispatched: register_counter!(
            "voyager_dispatcher_dispatched_total",
            "Targets handed to the local crawler"
        )?,
        spool_files: register_counter_vec!(
            "voyager_reporter_files_total",
            "Spool files handled by the reporter, by outcome",
            &["outcome"]
        )?,
    };

    FRONTIER_METRICS
        .set(frontier)
        .map_err(|_| "Frontier metrics already initialized")?;
    WORKER_METRICS
        .set(worker)
        .map_err(|_| "Worker metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    FRONTIER_METRICS.get().is_some() && WORKER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a next-target request (`target`, `empty`, `error`)
pub fn record_next_request(result: &str) {
    if let Some(m) = FRONTIER_METRICS.get() {
        m.next_requests.with_label_values(&[result]).inc();
    }
}

pub fn record_claim_conflict() {
    if let Some(m) = FRONTIER_METRICS.get() {
        m.claim_conflicts.inc();
    }
}

/// Record one admission outcome
pub fn record_admission(outcome: &str) {
    if let Some(m) = FRONTIER_METRICS.get() {
        m.admissions.with_label_values(&[outcome]).inc();
    }
}

pub fn record_discovered_report() {
    if let Some(m) = FRONTIER_METRICS.get() {
        m.discovered_reports.inc();
    }
}

/// Record content batch results
pub fn record_content_items(written: usize, failed: usize) {
    let Some(m) = FRONTIER_METRICS.get() else {
        return;
    };

    if written > 0 {
        m.content_items
            .with_label_values(&["written"])
            .inc_by(written as f64);
    }
    if failed > 0 {
        m.content_items
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
    }
}

/// Update record gauges from a status count
pub fn set_records_by_status(counts: &StatusCounts) {
    let Some(m) = FRONTIER_METRICS.get() else {
        return;
    };

    m.records.with_label_values(&["pending"]).set(counts.pending as f64);
    m.records
        .with_label_values(&["in_progress"])
        .set(counts.in_progress as f64);
    m.records.with_label_values(&["done"]).set(counts.done as f64);
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = FRONTIER_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record a dispatcher sleep (`empty`, `fault`, `saturated`)
pub fn record_backoff(cause: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.backoffs.with_label_values(&[cause]).inc();
    }
}

pub fn record_dispatched() {
    if let Some(m) = WORKER_METRICS.get() {
        m.dispatched.inc();
    }
}

/// Record one spool file outcome (`uploaded`, `invalid`, `failed`, `partial`)
pub fn record_spool_file(outcome: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.spool_files.with_label_values(&[outcome]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Orchestration service
//!
//! Request handlers layered over the frontier, the admission gate and the
//! storage collaborators. Handlers hold no locks of their own; concurrent
//! callers are kept consistent by the target store's compare-and-set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frontier::{
    AdmissionGate, AdmissionSummary, CandidateOutcome, Frontier, FrontierConfig, FrontierStats,
    Selection,
};
use crate::metrics;
use crate::models::{Candidate, ContentItem, ReferenceEdge, TargetId, TargetInfo, TargetRecord};
use crate::storage::{
    BatchWriteReport, ContentStore, GraphStore, StoreError, Stores, TargetStore, Transition,
};
use crate::utils::Clock;

use super::config::CoordinatorConfig;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Answer to a next-target request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextTarget {
    Target(TargetId),
    /// No eligible work; try again later
    Wait,
}

/// References discovered while crawling `source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub source: TargetInfo,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Acknowledgement of a discovery report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAck {
    pub source: TargetId,
    pub admitted: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub outcomes: Vec<CandidateOutcome>,

    /// False when the source was not `in_progress` (unknown, pending, or already done)
    pub source_marked_done: bool,

    /// Graph writes that failed; the rest of the report still applied
    #[serde(default)]
    pub graph_errors: usize,
}

/// Content items harvested from one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentReport {
    pub target_id: TargetId,
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

/// One target for operator injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectTarget {
    pub target_id: TargetId,
    #[serde(default)]
    pub display_name: Option<String>,

    /// Defaults to the configured injection priority
    #[serde(default)]
    pub priority: Option<i64>,
}

impl InjectTarget {
    pub fn new(target_id: impl Into<TargetId>) -> Self {
        Self {
            target_id: target_id.into(),
            display_name: None,
            priority: None,
        }
    }
}

/// Result of an injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectAck {
    pub summary: AdmissionSummary,
    pub outcomes: Vec<CandidateOutcome>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request itself is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    frontier: Frontier,
    gate: AdmissionGate,
    targets: Arc<dyn TargetStore>,
    content: Arc<dyn ContentStore>,
    graph: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
    inject_priority: i64,
    empty_signal: TargetId,
}

impl Orchestrator {
    /// `coordinator` supplies the injection priority and the empty signal,
    /// which is reserved and never admitted as a target id.
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        frontier_config: FrontierConfig,
        coordinator: &CoordinatorConfig,
    ) -> Self {
        let empty_signal = TargetId::from(coordinator.empty_signal.as_str());
        let gate = AdmissionGate::new(
            Arc::clone(&stores.targets),
            Arc::clone(&clock),
            frontier_config.max_outstanding,
        )
        .with_reserved_id(empty_signal.clone());
        let frontier = Frontier::new(Arc::clone(&stores.targets), Arc::clone(&clock), frontier_config);

        Self {
            frontier,
            gate,
            targets: stores.targets,
            content: stores.content,
            graph: stores.graph,
            clock,
            inject_priority: coordinator.inject_priority,
            empty_signal,
        }
    }

    pub fn empty_signal(&self) -> &str {
        self.empty_signal.as_str()
    }

    /// Hand out the next target, or `Wait` when nothing is eligible
    pub async fn request_next(&self) -> ServiceResult<NextTarget> {
        match self.frontier.next().await {
            Ok(Selection::Claimed(record)) => {
                metrics::record_next_request("target");
                info!(target_id = %record.target_id, priority = record.priority, "Dispatched target");
                Ok(NextTarget::Target(record.target_id))
            }
            Ok(Selection::Empty(_)) | Ok(Selection::Contended { .. }) => {
                metrics::record_next_request("empty");
                Ok(NextTarget::Wait)
            }
            Err(e) => {
                metrics::record_next_request("error");
                Err(e.into())
            }
        }
    }

    /// Admit discovered candidates, record the reference graph, and mark the
    /// source as freshly visited.
    pub async fn report_discovered(&self, report: DiscoveryReport) -> ServiceResult<DiscoveryAck> {
        let source_id = report.source.target_id.clone();
        if source_id.is_empty() {
            return Err(ServiceError::InvalidRequest("source target_id is empty".into()));
        }
        if let Some(bad) = report.candidates.iter().find(|c| c.target_id.is_empty()) {
            return Err(ServiceError::InvalidRequest(format!(
                "candidate with empty target_id (weight {})",
                bad.weight
            )));
        }

        metrics::record_discovered_report();

        let outcomes = self.gate.admit(&report.candidates, false).await?;
        let summary = AdmissionSummary::from_outcomes(&outcomes);

        let source_marked_done = match self
            .targets
            .update_status(&source_id, Transition::complete(), self.clock.now())
            .await
        {
            Ok(_) => true,
            Err(StoreError::Conflict { actual, .. }) => {
                warn!(target_id = %source_id, status = %actual, "Discovery report for a source that is not in progress");
                false
            }
            Err(StoreError::NotFound(_)) => {
                warn!(target_id = %source_id, "Discovery report for an unknown source");
                false
            }
            Err(e) => return Err(e.into()),
        };

        let graph_errors = self.record_references(&report, source_marked_done).await;

        info!(
            target_id = %source_id,
            admitted = summary.admitted,
            skipped = summary.skipped,
            rejected = summary.rejected,
            source_marked_done,
            "Processed discovery report"
        );

        Ok(DiscoveryAck {
            source: source_id,
            admitted: summary.admitted,
            skipped: summary.skipped,
            rejected: summary.rejected,
            outcomes,
            source_marked_done,
            graph_errors,
        })
    }

    /// Upsert the source node, then a node per candidate. Edge weights are
    /// only incremented when the report completed a visit, so a duplicate
    /// delivery of the same report does not count its references twice.
    ///
    /// Failures are logged and counted; admission and completion still proceed.
    async fn record_references(&self, report: &DiscoveryReport, completed_visit: bool) -> usize {
        let mut errors = 0;

        if let Err(e) = self.graph.upsert_node(&report.source).await {
            warn!(target_id = %report.source.target_id, error = %e, "Failed to upsert source node");
            errors += 1;
        }

        for candidate in &report.candidates {
            if let Err(e) = self.graph.upsert_node(&TargetInfo::from(candidate)).await {
                warn!(target_id = %candidate.target_id, error = %e, "Failed to upsert node");
                errors += 1;
            }
            if !completed_visit {
                continue;
            }

            let edge = ReferenceEdge {
                source: report.source.target_id.clone(),
                destination: candidate.target_id.clone(),
                weight: candidate.weight,
            };
            if let Err(e) = self.graph.upsert_edge(&edge).await {
                warn!(source = %edge.source, destination = %edge.destination, error = %e, "Failed to upsert edge");
                errors += 1;
            }
        }

        errors
    }

    /// Persist harvested items; not part of scheduling
    pub async fn report_content(&self, report: ContentReport) -> ServiceResult<BatchWriteReport> {
        if report.target_id.is_empty() {
            return Err(ServiceError::InvalidRequest("target_id is empty".into()));
        }

        let result = self.content.write_batch(&report.target_id, &report.items).await?;
        metrics::record_content_items(result.succeeded(), result.failed());

        if result.all_ok() {
            debug!(target_id = %report.target_id, items = result.succeeded(), "Stored content batch");
        } else {
            warn!(
                target_id = %report.target_id,
                written = result.succeeded(),
                failed = result.failed(),
                "Content batch partially failed"
            );
        }
        Ok(result)
    }

    /// Operator injection: bypasses the capacity cap, never dedup
    pub async fn inject(&self, targets: &[InjectTarget]) -> ServiceResult<InjectAck> {
        if targets.iter().any(|t| t.target_id.is_empty()) {
            return Err(ServiceError::InvalidRequest("target_id is empty".into()));
        }
        if targets.iter().any(|t| t.target_id == self.empty_signal) {
            return Err(ServiceError::InvalidRequest(format!(
                "target_id {:?} is reserved as the empty signal",
                self.empty_signal.as_str()
            )));
        }

        let candidates: Vec<Candidate> = targets
            .iter()
            .map(|t| Candidate {
                target_id: t.target_id.clone(),
                display_name: t.display_name.clone(),
                weight: t.priority.unwrap_or(self.inject_priority),
            })
            .collect();

        let outcomes = self.gate.admit(&candidates, true).await?;
        let summary = AdmissionSummary::from_outcomes(&outcomes);
        info!(admitted = summary.admitted, skipped = summary.skipped, "Injected targets");

        Ok(InjectAck { summary, outcomes })
    }

    pub async fn target(&self, target_id: &TargetId) -> ServiceResult<Option<TargetRecord>> {
        Ok(self.targets.get(target_id).await?)
    }

    pub fn frontier_config(&self) -> &FrontierConfig {
        self.frontier.config()
    }

    pub async fn stats(&self) -> ServiceResult<FrontierStats> {
        Ok(self.frontier.stats().await?)
    }
}

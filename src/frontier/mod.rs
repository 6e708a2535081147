//! Crawl frontier
//!
//! The frontier hands out exactly one target per request under concurrent
//! demand. Selection runs against a possibly stale snapshot; staleness is
//! corrected by the store's compare-and-set. A lost race restarts selection
//! against a fresh snapshot, up to `max_claim_attempts` times, after which
//! the request is answered as empty rather than spinning.
//!
//! # Modules
//!
//! - [`policy`] - Pure selection decision over a snapshot
//! - [`admission`] - Capacity and dedup gate for discovered targets

pub mod admission;
pub mod policy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics;
use crate::models::{TargetRecord, TargetStatus};
use crate::storage::{
    RecordFilter, RecordOrder, StatusCounts, StoreError, StoreResult, TargetStore, Transition,
};
use crate::utils::Clock;

pub use admission::{AdmissionGate, AdmissionOutcome, AdmissionSummary, CandidateOutcome};
pub use policy::{Decision, EmptyReason};

/// Upper bound for the re-visit interval (100 years)
const MAX_REVISIT_SECS: u64 = 100 * 365 * 24 * 3600;

/// Frontier tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    /// Minimum time between two visits of the same target, in seconds
    pub min_revisit_interval_secs: u64,

    /// Soft cap on the total number of records
    pub max_outstanding: usize,

    /// Selection passes per request before answering empty
    pub max_claim_attempts: u32,

    /// Records read per status for each selection snapshot
    pub sample_size: usize,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            min_revisit_interval_secs: 86_400,
            max_outstanding: 10_000,
            max_claim_attempts: 5,
            sample_size: 10_000,
        }
    }
}

impl FrontierConfig {
    pub fn min_revisit_interval(&self) -> Duration {
        Duration::from_secs(self.min_revisit_interval_secs)
    }

    fn revisit_delta(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_revisit_interval_secs.min(MAX_REVISIT_SECS) as i64)
    }
}

/// Result of [`Frontier::next`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The record was moved to `in_progress` for this caller
    Claimed(TargetRecord),

    /// Nothing is eligible right now
    Empty(EmptyReason),

    /// Every attempt lost its claim race
    Contended { attempts: u32 },
}

impl Selection {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Selection::Claimed(_))
    }

    pub fn into_record(self) -> Option<TargetRecord> {
        match self {
            Selection::Claimed(record) => Some(record),
            _ => None,
        }
    }
}

/// Counters and record counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierStats {
    pub records: StatusCounts,
    pub claims: u64,
    pub conflicts: u64,
    pub empty_responses: u64,
}

pub struct Frontier {
    store: Arc<dyn TargetStore>,
    clock: Arc<dyn Clock>,
    config: FrontierConfig,
    claims: AtomicU64,
    conflicts: AtomicU64,
    empty_responses: AtomicU64,
}

impl Frontier {
    pub fn new(store: Arc<dyn TargetStore>, clock: Arc<dyn Clock>, config: FrontierConfig) -> Self {
        Self {
            store,
            clock,
            config,
            claims: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            empty_responses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &FrontierConfig {
        &self.config
    }

    /// Claim the next target
    pub async fn next(&self) -> StoreResult<Selection> {
        let interval = self.config.revisit_delta();
        let attempts = self.config.max_claim_attempts.max(1);

        for attempt in 1..=attempts {
            let snapshot = self.snapshot().await?;
            let now = self.clock.now();

            let (target_id, from) = match policy::select(&snapshot, now, interval) {
                Decision::Claim { target_id, from } => (target_id, from),
                Decision::Empty(reason) => {
                    self.empty_responses.fetch_add(1, Ordering::Relaxed);
                    debug!(?reason, "Frontier empty");
                    return Ok(Selection::Empty(reason));
                }
            };

            match self
                .store
                .update_status(&target_id, Transition::claim(from)?, now)
                .await
            {
                Ok(record) => {
                    self.claims.fetch_add(1, Ordering::Relaxed);
                    debug!(target_id = %record.target_id, %from, attempt, "Claimed target");
                    return Ok(Selection::Claimed(record));
                }
                Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound(_)) => {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    metrics::record_claim_conflict();
                    debug!(%target_id, attempt, "Lost claim race, reselecting");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts, "Claim attempts exhausted, answering empty");
        self.empty_responses.fetch_add(1, Ordering::Relaxed);
        Ok(Selection::Contended { attempts })
    }

    /// Visible records: best pending candidates plus stalest done candidates
    async fn snapshot(&self) -> StoreResult<Vec<TargetRecord>> {
        let sample = self.config.sample_size.max(1);

        let mut records = self
            .store
            .list(
                &RecordFilter::with_status(TargetStatus::Pending)
                    .ordered(RecordOrder::PriorityDesc)
                    .limit(sample),
            )
            .await?;

        // Done records only matter once pending work is exhausted
        if records.is_empty() {
            records = self
                .store
                .list(
                    &RecordFilter::with_status(TargetStatus::Done)
                        .ordered(RecordOrder::StalestFirst)
                        .limit(sample),
                )
                .await?;
        }

        Ok(records)
    }

    pub async fn stats(&self) -> StoreResult<FrontierStats> {
        let records = self.store.status_counts().await?;
        metrics::set_records_by_status(&records);
        Ok(FrontierStats {
            records,
            claims: self.claims.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            empty_responses: self.empty_responses.load(Ordering::Relaxed),
        })
    }
}

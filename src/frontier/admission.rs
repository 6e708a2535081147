//! Admission and dedup gate for newly discovered targets

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::metrics;
use crate::models::{Candidate, TargetId, TargetRecord};
use crate::storage::{StoreError, StoreResult, TargetStore};
use crate::utils::Clock;

/// Result of admitting a single candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// A new pending record was created
    Admitted,

    /// A record with this id already exists, in any status
    SkippedAlreadyKnown,

    /// The store was at capacity when the batch arrived
    RejectedCapacity,

    /// The id collides with the coordinator's empty signal
    RejectedReserved,
}

impl AdmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::SkippedAlreadyKnown => "skipped_already_known",
            Self::RejectedCapacity => "rejected_capacity",
            Self::RejectedReserved => "rejected_reserved",
        }
    }
}

/// Outcome for one candidate, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub target_id: TargetId,
    pub outcome: AdmissionOutcome,
}

/// Admission gate over a [`TargetStore`]
///
/// The capacity check is a single `count()` read per batch. Concurrent batches
/// may therefore push the store slightly past `max_outstanding`; the cap is a
/// soft bound.
pub struct AdmissionGate {
    store: Arc<dyn TargetStore>,
    clock: Arc<dyn Clock>,
    max_outstanding: usize,
    reserved: Option<TargetId>,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn TargetStore>, clock: Arc<dyn Clock>, max_outstanding: usize) -> Self {
        Self {
            store,
            clock,
            max_outstanding,
            reserved: None,
        }
    }

    /// Never admit `id`. Workers read a target equal to the empty signal as
    /// "no work", so such a record could be claimed but never completed.
    pub fn with_reserved_id(mut self, id: impl Into<TargetId>) -> Self {
        self.reserved = Some(id.into());
        self
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    /// Admit `candidates`, returning one outcome per candidate in input order.
    ///
    /// `force` bypasses the capacity check only; known ids are always skipped.
    pub async fn admit(
        &self,
        candidates: &[Candidate],
        force: bool,
    ) -> StoreResult<Vec<CandidateOutcome>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let outstanding = self.store.count().await?;
        if !force && outstanding >= self.max_outstanding {
            info!(
                outstanding,
                max_outstanding = self.max_outstanding,
                rejected = candidates.len(),
                "Frontier at capacity, rejecting batch"
            );
            return Ok(candidates
                .iter()
                .map(|c| self.record(&c.target_id, AdmissionOutcome::RejectedCapacity))
                .collect());
        }

        let now = self.clock.now();
        let mut outcomes = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let outcome = self.admit_one(candidate, now).await?;
            outcomes.push(self.record(&candidate.target_id, outcome));
        }

        Ok(outcomes)
    }

    async fn admit_one(
        &self,
        candidate: &Candidate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<AdmissionOutcome> {
        if self.reserved.as_ref() == Some(&candidate.target_id) {
            debug!(target_id = %candidate.target_id, "Refusing reserved target id");
            return Ok(AdmissionOutcome::RejectedReserved);
        }
        if self.store.exists(&candidate.target_id).await? {
            return Ok(AdmissionOutcome::SkippedAlreadyKnown);
        }

        let record = TargetRecord::pending(
            candidate.target_id.clone(),
            candidate.display_name.clone(),
            candidate.weight,
            now,
        );

        match self.store.create(record).await {
            Ok(()) => {
                debug!(target_id = %candidate.target_id, priority = candidate.weight, "Admitted target");
                Ok(AdmissionOutcome::Admitted)
            }
            // Lost a creation race with another admitter
            Err(StoreError::AlreadyExists(_)) => Ok(AdmissionOutcome::SkippedAlreadyKnown),
            Err(e) => Err(e),
        }
    }

    fn record(&self, target_id: &TargetId, outcome: AdmissionOutcome) -> CandidateOutcome {
        metrics::record_admission(outcome.as_str());
        CandidateOutcome {
            target_id: target_id.clone(),
            outcome,
        }
    }
}

/// Tally of outcomes by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSummary {
    pub admitted: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl AdmissionSummary {
    pub fn from_outcomes(outcomes: &[CandidateOutcome]) -> Self {
        let mut summary = Self::default();
        for o in outcomes {
            match o.outcome {
                AdmissionOutcome::Admitted => summary.admitted += 1,
                AdmissionOutcome::SkippedAlreadyKnown => summary.skipped += 1,
                AdmissionOutcome::RejectedCapacity | AdmissionOutcome::RejectedReserved => {
                    summary.rejected += 1
                }
            }
        }
        summary
    }
}

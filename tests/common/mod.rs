//! Common test utilities

use chrono::{DateTime, Utc};
use std::sync::Arc;
use voyager::coordinator::{CoordinatorConfig, Orchestrator};
use voyager::frontier::FrontierConfig;
use voyager::models::{TargetId, TargetRecord, TargetStatus};
use voyager::storage::Stores;
use voyager::utils::ManualClock;

/// Fixed start time for deterministic tests
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Orchestrator over in-memory stores driven by a manual clock
pub struct TestCoordinator {
    pub orchestrator: Arc<Orchestrator>,
    pub clock: Arc<ManualClock>,
    #[allow(dead_code)]
    pub stores: Stores,
}

pub fn coordinator(min_revisit_interval_secs: u64, max_outstanding: usize) -> TestCoordinator {
    coordinator_with_stores(Stores::in_memory(), min_revisit_interval_secs, max_outstanding)
}

pub fn coordinator_with_stores(
    stores: Stores,
    min_revisit_interval_secs: u64,
    max_outstanding: usize,
) -> TestCoordinator {
    let clock = Arc::new(ManualClock::new(t0()));
    let config = FrontierConfig {
        min_revisit_interval_secs,
        max_outstanding,
        ..FrontierConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        stores.clone(),
        clock.clone(),
        config,
        &CoordinatorConfig::default(),
    ));
    TestCoordinator {
        orchestrator,
        clock,
        stores,
    }
}

/// Pending record with the given priority, enqueued at `t0()`
#[allow(dead_code)]
pub fn pending(id: &str, priority: i64) -> TargetRecord {
    TargetRecord::pending(TargetId::from(id), None, priority, t0())
}

/// Done record last visited at `visited`
#[allow(dead_code)]
pub fn done(id: &str, visited: DateTime<Utc>) -> TargetRecord {
    TargetRecord {
        status: TargetStatus::Done,
        visit_started_at: Some(visited),
        ..pending(id, 0)
    }
}

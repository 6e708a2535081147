//! Worker poll loop
//!
//! Each worker process runs one dispatcher:
//!
//! ```text
//!            ┌──────────────────── marker count >= limit: sleep WAIT_TIME
//!            ▼                  │
//!   Idle ──► Requesting ──► target ──► write marker, reset backoff ──► Idle
//!                         │
//!                         └─ wait / fault ──► sleep RELIEF_TIME * 2^k ──► Idle
//! ```
//!
//! The crawl itself happens outside this loop. The local crawler picks up
//! markers, and the reporter clears them once results have been delivered.
//! Faults never stop the loop; only the shutdown signal does.

pub mod backoff;
pub mod markers;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::coordinator::{ClientError, CoordinatorClient, NextTarget};
use crate::error::{Error, VoyagerErrorTrait};
use crate::metrics;
use crate::models::TargetId;

pub use backoff::Backoff;
pub use markers::{MarkerError, MarkerSet};

/// Where the dispatcher gets work from
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn next_target(&self) -> Result<NextTarget, ClientError>;
}

#[async_trait]
impl WorkSource for CoordinatorClient {
    async fn next_target(&self) -> Result<NextTarget, ClientError> {
        CoordinatorClient::next_target(self).await
    }
}

/// Dispatcher tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Local in-flight limit, counted in markers
    pub max_local_inflight: usize,

    /// Sleep while the local limit is reached, in seconds
    pub wait_time_secs: u64,

    /// Backoff base, in seconds
    pub relief_time_secs: u64,

    pub marker_dir: PathBuf,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_local_inflight: 3,
            wait_time_secs: 10,
            relief_time_secs: 30,
            marker_dir: PathBuf::from("data/markers"),
        }
    }
}

impl DispatcherConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    pub fn relief_time(&self) -> Duration {
        Duration::from_secs(self.relief_time_secs)
    }
}

/// Result of one poll iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A target was received and a marker written
    Dispatched(TargetId),

    /// No work or a fault; sleep this long
    Backoff(Duration),

    /// Local in-flight limit reached; sleep this long
    Saturated(Duration),
}

impl PollOutcome {
    pub fn delay(&self) -> Duration {
        match self {
            Self::Dispatched(_) => Duration::ZERO,
            Self::Backoff(d) | Self::Saturated(d) => *d,
        }
    }
}

/// Counters for one dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub dispatched: u64,
    pub empty: u64,
    pub faults: u64,
    pub saturated: u64,
}

pub struct Dispatcher<S> {
    source: S,
    markers: MarkerSet,
    config: DispatcherConfig,
    backoff: Backoff,
    stats: DispatcherStats,
}

impl<S: WorkSource> Dispatcher<S> {
    pub fn new(source: S, markers: MarkerSet, config: DispatcherConfig) -> Self {
        let backoff = Backoff::new(config.relief_time());
        Self {
            source,
            markers,
            config,
            backoff,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    /// One pass of the state machine, without sleeping.
    ///
    /// Coordinator faults become a backoff; only marker failures are errors.
    pub async fn poll_once(&mut self) -> crate::error::Result<PollOutcome> {
        let in_flight = self.markers.blocking(MarkerSet::count).await?;
        if in_flight >= self.config.max_local_inflight {
            self.stats.saturated += 1;
            metrics::record_backoff("saturated");
            debug!(in_flight, limit = self.config.max_local_inflight, "Local in-flight limit reached");
            return Ok(PollOutcome::Saturated(self.config.wait_time()));
        }

        match self.source.next_target().await {
            Ok(NextTarget::Target(target_id)) => {
                let marked = target_id.clone();
                self.markers.blocking(move |m| m.add(&marked)).await?;
                self.backoff.reset();
                self.stats.dispatched += 1;
                metrics::record_dispatched();
                info!(target_id = %target_id, "Dispatched target to local crawler");
                Ok(PollOutcome::Dispatched(target_id))
            }
            Ok(NextTarget::Wait) => {
                self.stats.empty += 1;
                metrics::record_backoff("empty");
                let delay = self.backoff.next_delay();
                debug!(
                    failures = self.backoff.failures(),
                    delay_secs = delay.as_secs(),
                    "Frontier empty, backing off"
                );
                Ok(PollOutcome::Backoff(delay))
            }
            Err(e) => {
                self.stats.faults += 1;
                metrics::record_backoff("fault");
                let delay = self.backoff.next_delay();
                let err = Error::from(e);
                if err.is_recoverable() {
                    warn!(
                        error = %err,
                        category = err.category().as_str(),
                        failures = self.backoff.failures(),
                        delay_secs = delay.as_secs(),
                        "Coordinator request failed, backing off"
                    );
                } else {
                    // Retrying will not help until the coordinator or this worker changes
                    error!(
                        error = %err,
                        category = err.category().as_str(),
                        delay_secs = delay.as_secs(),
                        "Coordinator rejected the request"
                    );
                }
                Ok(PollOutcome::Backoff(delay))
            }
        }
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_local_inflight = self.config.max_local_inflight,
            relief_time_secs = self.config.relief_time_secs,
            marker_dir = %self.markers.dir().display(),
            "Dispatcher started"
        );

        while !*shutdown.borrow() {
            let delay = match self.poll_once().await {
                Ok(outcome) => outcome.delay(),
                Err(e) => {
                    warn!(error = %e, category = e.category().as_str(), "Marker store failure");
                    self.config.wait_time()
                }
            };

            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!(
            dispatched = self.stats.dispatched,
            empty = self.stats.empty,
            faults = self.stats.faults,
            "Dispatcher shutting down"
        );
    }
}

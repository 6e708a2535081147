//! voyager - crawl frontier coordinator and worker dispatcher
//!
//! A coordinator hands out crawl targets to a fleet of workers, one at a
//! time, preferring never-visited targets and re-visiting the stalest ones
//! once a minimum interval has passed. Workers poll it with exponential
//! backoff and report what they discovered, which feeds new targets back
//! into the frontier.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Target records, candidates and content items
//! - [`storage`] - Target/content/graph stores (in-memory, SQLite)
//! - [`frontier`] - Selection policy, claim loop and admission gate
//! - [`coordinator`] - Orchestration service, HTTP API, server and client
//! - [`dispatcher`] - Worker poll loop with backoff and in-flight markers
//! - [`reporter`] - Spool-directory uploader for crawl results
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Retry helper and injectable clock
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voyager::config::Config;
//! use voyager::coordinator::{CoordinatorServer, Orchestrator};
//! use voyager::utils::SystemClock;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         config.storage.open()?,
//!         Arc::new(SystemClock),
//!         config.frontier.clone(),
//!         &config.coordinator,
//!     ));
//!     let server = CoordinatorServer::new(config.coordinator.clone(), orchestrator)?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod frontier;
pub mod metrics;
pub mod models;
pub mod reporter;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{CoordinatorClient, NextTarget, Orchestrator};
    pub use crate::dispatcher::{Dispatcher, MarkerSet};
    pub use crate::error::{Error, ErrorCategory, Result, VoyagerErrorTrait};
    pub use crate::frontier::{AdmissionOutcome, Frontier, Selection};
    pub use crate::models::{Candidate, TargetId, TargetRecord, TargetStatus};
    pub use crate::reporter::Reporter;
    pub use crate::storage::{Stores, TargetStore};
}

// Direct re-exports for convenience
pub use models::{Candidate, TargetId, TargetRecord, TargetStatus};

//! Storage abstractions for the frontier and its collaborators
//!
//! The scheduler only talks to traits, so the backing engine can be swapped:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Frontier / AdmissionGate / Orchestrator          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        TargetStore    ContentStore    GraphStore            │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//!       ┌─────────────────┐            ┌─────────────────┐
//!       │     memory      │            │     sqlite      │
//!       └─────────────────┘            └─────────────────┘
//! ```
//!
//! The target store owns all record state. Its one synchronization point is
//! [`TargetStore::update_status`], a compare-and-set on `status`: of several
//! callers racing to move the same record, exactly one wins and the others get
//! [`StoreError::Conflict`].

pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ContentItem, ReferenceEdge, TargetId, TargetInfo, TargetRecord, TargetStatus};

pub use memory::{InMemoryContentStore, InMemoryGraphStore, InMemoryTargetStore};
pub use sqlite::{SqliteContentStore, SqliteGraphStore, SqliteTargetStore};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the storage layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A record with this id already exists
    #[error("target already exists: {0}")]
    AlreadyExists(TargetId),

    /// Lost a status compare-and-set race
    #[error("status conflict on {target_id}: expected {expected}, found {actual}")]
    Conflict {
        target_id: TargetId,
        expected: TargetStatus,
        actual: TargetStatus,
    },

    #[error("target not found: {0}")]
    NotFound(TargetId),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: TargetStatus, to: TargetStatus },

    /// Engine-level failure (I/O, SQL, poisoned lock)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Query Types
// ============================================================================

/// Ordering applied by [`TargetStore::list`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// No particular order
    #[default]
    Unordered,

    /// Highest priority first, then earliest `enqueued_at`, then id
    PriorityDesc,

    /// Earliest `visit_started_at` first (never started counts as oldest), then id
    StalestFirst,
}

/// Filter for listing target records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<TargetStatus>,
    pub order: RecordOrder,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: TargetStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn ordered(mut self, order: RecordOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A requested status change, checked against [`TargetStatus::can_transition_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TargetStatus,
    pub to: TargetStatus,
}

impl Transition {
    pub fn new(from: TargetStatus, to: TargetStatus) -> StoreResult<Self> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn claim(from: TargetStatus) -> StoreResult<Self> {
        Self::new(from, TargetStatus::InProgress)
    }

    pub fn complete() -> Self {
        Self {
            from: TargetStatus::InProgress,
            to: TargetStatus::Done,
        }
    }
}

/// Record counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TargetRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status);
        }
        counts
    }

    pub fn add(&mut self, status: TargetStatus) {
        self.total += 1;
        match status {
            TargetStatus::Pending => self.pending += 1,
            TargetStatus::InProgress => self.in_progress += 1,
            TargetStatus::Done => self.done += 1,
        }
    }
}

/// Per-item outcome of a content batch write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemWriteResult {
    pub item_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Result of a content batch write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWriteReport {
    pub results: Vec<ItemWriteResult>,
}

impl BatchWriteReport {
    pub fn push_ok(&mut self, item_id: &str) {
        self.results.push(ItemWriteResult {
            item_id: item_id.to_string(),
            ok: true,
            error: None,
        });
    }

    pub fn push_err(&mut self, item_id: &str, error: impl Into<String>) {
        self.results.push(ItemWriteResult {
            item_id: item_id.to_string(),
            ok: false,
            error: Some(error.into()),
        });
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }
}

// ============================================================================
// Store Traits
// ============================================================================

/// Persistent set of target records
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Insert a new record; fails with `AlreadyExists` instead of overwriting
    async fn create(&self, record: TargetRecord) -> StoreResult<()>;

    async fn get(&self, target_id: &TargetId) -> StoreResult<Option<TargetRecord>>;

    async fn list(&self, filter: &RecordFilter) -> StoreResult<Vec<TargetRecord>>;

    /// Atomically apply `transition` if the record is currently in `transition.from`.
    ///
    /// Stamps `visit_started_at = at` and returns the updated record.
    async fn update_status(
        &self,
        target_id: &TargetId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreResult<TargetRecord>;

    /// Total records regardless of status
    async fn count(&self) -> StoreResult<usize>;

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let records = self.list(&RecordFilter::all()).await?;
        Ok(StatusCounts::from_records(&records))
    }

    async fn exists(&self, target_id: &TargetId) -> StoreResult<bool> {
        Ok(self.get(target_id).await?.is_some())
    }
}

/// Document store for harvested content items
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write items keyed by `(target_id, item_id)`, reporting each item separately
    async fn write_batch(
        &self,
        target_id: &TargetId,
        items: &[ContentItem],
    ) -> StoreResult<BatchWriteReport>;
}

/// Graph store for the reference network; write-only from the frontier's view
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create or refresh a node
    async fn upsert_node(&self, info: &TargetInfo) -> StoreResult<()>;

    /// Create an edge, or add `edge.weight` to an existing one
    async fn upsert_edge(&self, edge: &ReferenceEdge) -> StoreResult<()>;
}

// ============================================================================
// Store Bundle
// ============================================================================

/// The three stores the coordinator writes to
#[derive(Clone)]
pub struct Stores {
    pub targets: Arc<dyn TargetStore>,
    pub content: Arc<dyn ContentStore>,
    pub graph: Arc<dyn GraphStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            targets: Arc::new(InMemoryTargetStore::new()),
            content: Arc::new(InMemoryContentStore::new()),
            graph: Arc::new(InMemoryGraphStore::new()),
        }
    }

    /// Open all three stores on one SQLite database file
    pub fn sqlite(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        Ok(Self {
            targets: Arc::new(SqliteTargetStore::open(path)?),
            content: Arc::new(SqliteContentStore::open(path)?),
            graph: Arc::new(SqliteGraphStore::open(path)?),
        })
    }
}

/// Sort records in place according to `order`
pub(crate) fn sort_records(records: &mut [TargetRecord], order: RecordOrder) {
    match order {
        RecordOrder::Unordered => {}
        RecordOrder::PriorityDesc => records.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then(a.target_id.cmp(&b.target_id))
        }),
        RecordOrder::StalestFirst => records.sort_by(|a, b| {
            a.visit_started_at
                .cmp(&b.visit_started_at)
                .then(a.target_id.cmp(&b.target_id))
        }),
    }
}

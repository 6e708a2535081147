//! In-memory store implementations
//!
//! Used by tests and by `STORAGE_BACKEND=memory`. Each store keeps its state
//! behind a single `RwLock`, so the status compare-and-set runs under one
//! write guard and is atomic with respect to every other caller.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    sort_records, BatchWriteReport, ContentStore, GraphStore, RecordFilter, StatusCounts,
    StoreError, StoreResult, TargetStore, Transition,
};
use crate::models::{ContentItem, ReferenceEdge, TargetId, TargetInfo, TargetRecord};

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StoreError::backend(format!("lock poisoned: {e}")))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StoreError::backend(format!("lock poisoned: {e}")))
}

// ============================================================================
// Target Store
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryTargetStore {
    records: RwLock<HashMap<TargetId, TargetRecord>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records, overwriting any with the same id
    pub fn with_records(records: impl IntoIterator<Item = TargetRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.target_id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn create(&self, record: TargetRecord) -> StoreResult<()> {
        let mut records = write(&self.records)?;
        if records.contains_key(&record.target_id) {
            return Err(StoreError::AlreadyExists(record.target_id));
        }
        records.insert(record.target_id.clone(), record);
        Ok(())
    }

    async fn get(&self, target_id: &TargetId) -> StoreResult<Option<TargetRecord>> {
        Ok(read(&self.records)?.get(target_id).cloned())
    }

    async fn list(&self, filter: &RecordFilter) -> StoreResult<Vec<TargetRecord>> {
        let mut matched: Vec<TargetRecord> = read(&self.records)?
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();

        sort_records(&mut matched, filter.order);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update_status(
        &self,
        target_id: &TargetId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreResult<TargetRecord> {
        let transition = Transition::new(transition.from, transition.to)?;
        let mut records = write(&self.records)?;
        let record = records
            .get_mut(target_id)
            .ok_or_else(|| StoreError::NotFound(target_id.clone()))?;

        if record.status != transition.from {
            return Err(StoreError::Conflict {
                target_id: target_id.clone(),
                expected: transition.from,
                actual: record.status,
            });
        }

        record.status = transition.to;
        record.visit_started_at = Some(at);
        Ok(record.clone())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(read(&self.records)?.len())
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        Ok(StatusCounts::from_records(read(&self.records)?.values()))
    }
}

// ============================================================================
// Content Store
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    items: RwLock<HashMap<(TargetId, String), ContentItem>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, target_id: &TargetId, item_id: &str) -> Option<ContentItem> {
        self.items
            .read()
            .ok()?
            .get(&(target_id.clone(), item_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn write_batch(
        &self,
        target_id: &TargetId,
        items: &[ContentItem],
    ) -> StoreResult<BatchWriteReport> {
        let mut stored = write(&self.items)?;
        let mut report = BatchWriteReport::default();

        for item in items {
            if item.item_id.trim().is_empty() {
                report.push_err(&item.item_id, "missing item_id");
                continue;
            }
            stored.insert((target_id.clone(), item.item_id.clone()), item.clone());
            report.push_ok(&item.item_id);
        }

        Ok(report)
    }
}

// ============================================================================
// Graph Store
// ============================================================================

#[derive(Debug, Default)]
struct Graph {
    nodes: HashMap<TargetId, TargetInfo>,
    edges: HashMap<(TargetId, TargetId), i64>,
}

#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, target_id: &TargetId) -> Option<TargetInfo> {
        self.graph.read().ok()?.nodes.get(target_id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().map(|g| g.nodes.len()).unwrap_or(0)
    }

    /// Accumulated weight of `source -> destination`, if the edge exists
    pub fn edge_weight(&self, source: &TargetId, destination: &TargetId) -> Option<i64> {
        self.graph
            .read()
            .ok()?
            .edges
            .get(&(source.clone(), destination.clone()))
            .copied()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.read().map(|g| g.edges.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, info: &TargetInfo) -> StoreResult<()> {
        let mut graph = write(&self.graph)?;
        match graph.nodes.get_mut(&info.target_id) {
            Some(existing) => merge_info(existing, info),
            None => {
                graph.nodes.insert(info.target_id.clone(), info.clone());
            }
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: &ReferenceEdge) -> StoreResult<()> {
        let mut graph = write(&self.graph)?;
        *graph
            .edges
            .entry((edge.source.clone(), edge.destination.clone()))
            .or_insert(0) += edge.weight;
        Ok(())
    }
}

/// Overwrite known fields, keep the rest
fn merge_info(existing: &mut TargetInfo, update: &TargetInfo) {
    if update.display_name.is_some() {
        existing.display_name = update.display_name.clone();
    }
    if update.title.is_some() {
        existing.title = update.title.clone();
    }
    if update.member_count.is_some() {
        existing.member_count = update.member_count;
    }
    if update.verified.is_some() {
        existing.verified = update.verified;
    }
}

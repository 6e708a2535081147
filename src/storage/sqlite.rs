//! SQLite-backed stores
//!
//! Each store owns one connection behind a `Mutex`. Timestamps are stored as
//! Unix milliseconds. The three stores may share a database file; WAL mode and
//! a busy timeout let their connections coexist.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    BatchWriteReport, ContentStore, GraphStore, RecordFilter, RecordOrder, StatusCounts,
    StoreError, StoreResult, TargetStore, Transition,
};
use crate::models::{ContentItem, ReferenceEdge, TargetId, TargetInfo, TargetRecord, TargetStatus};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) a database file tuned for concurrent access
fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::backend(format!("connection lock poisoned: {e}")))
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::backend(format!("timestamp out of range: {ms}")))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// Target Store
// ============================================================================

/// Row shape of the `targets` table before timestamp/status decoding
struct TargetRow {
    target_id: String,
    display_name: Option<String>,
    priority: i64,
    status: String,
    enqueued_at: i64,
    visit_started_at: Option<i64>,
}

impl TargetRow {
    const COLUMNS: &'static str =
        "target_id, display_name, priority, status, enqueued_at, visit_started_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            target_id: row.get(0)?,
            display_name: row.get(1)?,
            priority: row.get(2)?,
            status: row.get(3)?,
            enqueued_at: row.get(4)?,
            visit_started_at: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<TargetRecord> {
        let status = self
            .status
            .parse::<TargetStatus>()
            .map_err(StoreError::Backend)?;
        Ok(TargetRecord {
            target_id: TargetId::from(self.target_id),
            display_name: self.display_name,
            priority: self.priority,
            status,
            enqueued_at: from_millis(self.enqueued_at)?,
            visit_started_at: self.visit_started_at.map(from_millis).transpose()?,
        })
    }
}

pub struct SqliteTargetStore {
    conn: Mutex<Connection>,
}

impl SqliteTargetStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = Self {
            conn: Mutex::new(open_connection(path)?),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite target store initialized");
        Ok(store)
    }

    /// In-memory database (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS targets (
                    target_id TEXT PRIMARY KEY,
                    display_name TEXT,
                    priority INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'pending',
                    enqueued_at INTEGER NOT NULL,
                    visit_started_at INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_targets_pending
                    ON targets(status, priority DESC, enqueued_at);

                CREATE INDEX IF NOT EXISTS idx_targets_staleness
                    ON targets(status, visit_started_at);
                "#,
        )?;
        Ok(())
    }

    fn fetch(conn: &Connection, target_id: &TargetId) -> StoreResult<Option<TargetRecord>> {
        let sql = format!(
            "SELECT {} FROM targets WHERE target_id = ?1",
            TargetRow::COLUMNS
        );
        conn.query_row(&sql, params![target_id.as_str()], TargetRow::from_row)
            .optional()?
            .map(TargetRow::into_record)
            .transpose()
    }
}

#[async_trait]
impl TargetStore for SqliteTargetStore {
    async fn create(&self, record: TargetRecord) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        let result = conn.execute(
            "INSERT INTO targets (target_id, display_name, priority, status, enqueued_at, visit_started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.target_id.as_str(),
                record.display_name,
                record.priority,
                record.status.as_str(),
                to_millis(record.enqueued_at),
                record.visit_started_at.map(to_millis),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::AlreadyExists(record.target_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, target_id: &TargetId) -> StoreResult<Option<TargetRecord>> {
        let conn = lock(&self.conn)?;
        Self::fetch(&conn, target_id)
    }

    async fn list(&self, filter: &RecordFilter) -> StoreResult<Vec<TargetRecord>> {
        let mut sql = format!("SELECT {} FROM targets", TargetRow::COLUMNS);
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" WHERE status = ?1");
            args.push(status.as_str().to_string());
        }

        match filter.order {
            RecordOrder::Unordered => {}
            RecordOrder::PriorityDesc => {
                sql.push_str(" ORDER BY priority DESC, enqueued_at ASC, target_id ASC")
            }
            RecordOrder::StalestFirst => sql.push_str(
                " ORDER BY visit_started_at IS NOT NULL, visit_started_at ASC, target_id ASC",
            ),
        }

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), TargetRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(TargetRow::into_record).collect()
    }

    async fn update_status(
        &self,
        target_id: &TargetId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreResult<TargetRecord> {
        let transition = Transition::new(transition.from, transition.to)?;
        let conn = lock(&self.conn)?;

        let changed = conn.execute(
            "UPDATE targets SET status = ?1, visit_started_at = ?2
             WHERE target_id = ?3 AND status = ?4",
            params![
                transition.to.as_str(),
                to_millis(at),
                target_id.as_str(),
                transition.from.as_str(),
            ],
        )?;

        if changed == 0 {
            return match Self::fetch(&conn, target_id)? {
                None => Err(StoreError::NotFound(target_id.clone())),
                Some(current) => Err(StoreError::Conflict {
                    target_id: target_id.clone(),
                    expected: transition.from,
                    actual: current.status,
                }),
            };
        }

        Self::fetch(&conn, target_id)?.ok_or_else(|| StoreError::NotFound(target_id.clone()))
    }

    async fn count(&self) -> StoreResult<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM targets GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let n = n as usize;
            counts.total += n;
            match status.parse::<TargetStatus>().map_err(StoreError::Backend)? {
                TargetStatus::Pending => counts.pending += n,
                TargetStatus::InProgress => counts.in_progress += n,
                TargetStatus::Done => counts.done += n,
            }
        }
        Ok(counts)
    }
}

// ============================================================================
// Content Store
// ============================================================================

pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(open_connection(path.as_ref())?),
        };
        store.create_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS content_items (
                    target_id TEXT NOT NULL,
                    item_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    stored_at INTEGER NOT NULL,
                    PRIMARY KEY (target_id, item_id)
                );
                "#,
        )?;
        Ok(())
    }

    /// Stored item, if any
    pub fn get(&self, target_id: &TargetId, item_id: &str) -> StoreResult<Option<ContentItem>> {
        let conn = lock(&self.conn)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM content_items WHERE target_id = ?1 AND item_id = ?2",
                params![target_id.as_str(), item_id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::backend))
            .transpose()
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn write_batch(
        &self,
        target_id: &TargetId,
        items: &[ContentItem],
    ) -> StoreResult<BatchWriteReport> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let stored_at = to_millis(Utc::now());
        let mut report = BatchWriteReport::default();

        for item in items {
            if item.item_id.trim().is_empty() {
                report.push_err(&item.item_id, "missing item_id");
                continue;
            }

            let body = match serde_json::to_string(item) {
                Ok(body) => body,
                Err(e) => {
                    report.push_err(&item.item_id, e.to_string());
                    continue;
                }
            };

            match tx.execute(
                "INSERT OR REPLACE INTO content_items (target_id, item_id, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![target_id.as_str(), item.item_id, body, stored_at],
            ) {
                Ok(_) => report.push_ok(&item.item_id),
                Err(e) => report.push_err(&item.item_id, e.to_string()),
            }
        }

        tx.commit()?;
        Ok(report)
    }
}

// ============================================================================
// Graph Store
// ============================================================================

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(open_connection(path.as_ref())?),
        };
        store.create_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS nodes (
                    target_id TEXT PRIMARY KEY,
                    display_name TEXT,
                    title TEXT,
                    member_count INTEGER,
                    verified INTEGER
                );

                CREATE TABLE IF NOT EXISTS edges (
                    source TEXT NOT NULL,
                    destination TEXT NOT NULL,
                    weight INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (source, destination)
                );

                CREATE INDEX IF NOT EXISTS idx_edges_destination
                    ON edges(destination);
                "#,
        )?;
        Ok(())
    }

    pub fn edge_weight(&self, source: &TargetId, destination: &TargetId) -> StoreResult<Option<i64>> {
        let conn = lock(&self.conn)?;
        Ok(conn
            .query_row(
                "SELECT weight FROM edges WHERE source = ?1 AND destination = ?2",
                params![source.as_str(), destination.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn node(&self, target_id: &TargetId) -> StoreResult<Option<TargetInfo>> {
        let conn = lock(&self.conn)?;
        Ok(conn
            .query_row(
                "SELECT display_name, title, member_count, verified FROM nodes WHERE target_id = ?1",
                params![target_id.as_str()],
                |row| {
                    Ok(TargetInfo {
                        target_id: target_id.clone(),
                        display_name: row.get(0)?,
                        title: row.get(1)?,
                        member_count: row.get::<_, Option<i64>>(2)?.map(|n| n.max(0) as u64),
                        verified: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_node(&self, info: &TargetInfo) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO nodes (target_id, display_name, title, member_count, verified)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(target_id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, nodes.display_name),
                title = COALESCE(excluded.title, nodes.title),
                member_count = COALESCE(excluded.member_count, nodes.member_count),
                verified = COALESCE(excluded.verified, nodes.verified)",
            params![
                info.target_id.as_str(),
                info.display_name,
                info.title,
                info.member_count.map(|n| n.min(i64::MAX as u64) as i64),
                info.verified,
            ],
        )?;
        Ok(())
    }

    async fn upsert_edge(&self, edge: &ReferenceEdge) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO edges (source, destination, weight) VALUES (?1, ?2, ?3)
             ON CONFLICT(source, destination) DO UPDATE SET weight = weight + excluded.weight",
            params![edge.source.as_str(), edge.destination.as_str(), edge.weight],
        )?;
        Ok(())
    }
}

// Core data structures for the voyager frontier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier of a crawl target (a channel)
///
/// Serialized as a string; numeric ids are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Hex SHA256 of the id, used to name on-disk markers
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for TargetId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// Visitation status of a target record
///
/// State transitions:
/// - Pending -> InProgress -> Done
/// - Done -> InProgress (re-visit, once the minimum interval has elapsed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Known but never visited
    Pending,

    /// Claimed by a worker
    InProgress,

    /// Visited at least once
    Done,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: TargetStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Done)
                | (Self::Done, Self::InProgress)
        )
    }

    pub fn all() -> [TargetStatus; 3] {
        [Self::Pending, Self::InProgress, Self::Done]
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown target status: {other}")),
        }
    }
}

/// One record per known target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target_id: TargetId,
    pub display_name: Option<String>,

    /// Interest score (number of references observed at discovery time)
    pub priority: i64,

    pub status: TargetStatus,
    pub enqueued_at: DateTime<Utc>,

    /// Last transition into `InProgress` (or completion); `None` if never started
    pub visit_started_at: Option<DateTime<Utc>>,
}

impl TargetRecord {
    /// Create a fresh pending record
    pub fn pending(
        target_id: TargetId,
        display_name: Option<String>,
        priority: i64,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target_id,
            display_name,
            priority,
            status: TargetStatus::Pending,
            enqueued_at,
            visit_started_at: None,
        }
    }
}

/// A newly discovered target reported by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub target_id: TargetId,
    #[serde(default)]
    pub display_name: Option<String>,

    /// Number of references observed from the source
    pub weight: i64,
}

impl Candidate {
    pub fn new(target_id: impl Into<TargetId>, display_name: Option<&str>, weight: i64) -> Self {
        Self {
            target_id: target_id.into(),
            display_name: display_name.map(str::to_string),
            weight,
        }
    }
}

/// Metadata about a crawled target, as seen by the content client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub target_id: TargetId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub verified: Option<bool>,
}

impl TargetInfo {
    pub fn new(target_id: impl Into<TargetId>) -> Self {
        Self {
            target_id: target_id.into(),
            display_name: None,
            title: None,
            member_count: None,
            verified: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl From<&Candidate> for TargetInfo {
    fn from(candidate: &Candidate) -> Self {
        Self {
            target_id: candidate.target_id.clone(),
            display_name: candidate.display_name.clone(),
            title: None,
            member_count: None,
            verified: None,
        }
    }
}

/// Weighted "source references destination" relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub source: TargetId,
    pub destination: TargetId,
    pub weight: i64,
}

/// A raw content item harvested from a target
///
/// The frontier never looks inside `fields`; it is persisted as-is under
/// `(target_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub item_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ContentItem {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

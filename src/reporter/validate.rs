//! Spool payload parsing and validation

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::coordinator::{ContentReport, DiscoveryReport};

pub const DISCOVERED_SUFFIX: &str = ".discovered.json";
pub const CONTENT_SUFFIX: &str = ".content.json";

/// Kind of spool file, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolKind {
    Discovered,
    Content,
}

impl SpoolKind {
    /// `None` for files the reporter does not handle
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(DISCOVERED_SUFFIX) {
            Some(Self::Discovered)
        } else if name.ends_with(CONTENT_SUFFIX) {
            Some(Self::Content)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Content => "content",
        }
    }
}

/// A parsed, validated spool file
#[derive(Debug, Clone, PartialEq)]
pub enum SpoolPayload {
    Discovered(DiscoveryReport),
    Content(ContentReport),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty target_id")]
    EmptyTarget,

    #[error("candidate {index} has an empty target_id")]
    EmptyCandidate { index: usize },

    #[error("candidate {target_id} has negative weight {weight}")]
    NegativeWeight { target_id: String, weight: i64 },

    #[error("item {index} has an empty item_id")]
    EmptyItemId { index: usize },

    #[error("duplicate item_id {0}")]
    DuplicateItemId(String),
}

/// Parse and check a spool payload of the given kind
pub fn parse(kind: SpoolKind, bytes: &[u8]) -> Result<SpoolPayload, ValidationError> {
    match kind {
        SpoolKind::Discovered => {
            let report: DiscoveryReport = serde_json::from_slice(bytes)?;
            validate_discovered(&report)?;
            Ok(SpoolPayload::Discovered(report))
        }
        SpoolKind::Content => {
            let report: ContentReport = serde_json::from_slice(bytes)?;
            validate_content(&report)?;
            Ok(SpoolPayload::Content(report))
        }
    }
}

pub fn validate_discovered(report: &DiscoveryReport) -> Result<(), ValidationError> {
    if report.source.target_id.is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    for (index, candidate) in report.candidates.iter().enumerate() {
        if candidate.target_id.is_empty() {
            return Err(ValidationError::EmptyCandidate { index });
        }
        if candidate.weight < 0 {
            return Err(ValidationError::NegativeWeight {
                target_id: candidate.target_id.to_string(),
                weight: candidate.weight,
            });
        }
    }
    Ok(())
}

pub fn validate_content(report: &ContentReport) -> Result<(), ValidationError> {
    if report.target_id.is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    let mut seen = HashSet::new();
    for (index, item) in report.items.iter().enumerate() {
        if item.item_id.trim().is_empty() {
            return Err(ValidationError::EmptyItemId { index });
        }
        if !seen.insert(item.item_id.as_str()) {
            return Err(ValidationError::DuplicateItemId(item.item_id.clone()));
        }
    }
    Ok(())
}

//! Durable in-flight markers
//!
//! One file per dispatched target, named after the SHA256 of its id:
//!
//! - `<digest>.dat`: dispatched, waiting for the local crawler
//! - `<digest>.crawling`: picked up by the local crawler
//!
//! Both states count toward the local in-flight limit. The reporter removes
//! the marker once the target's discovery report has been delivered.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::TargetId;

const QUEUED_EXT: &str = "dat";
const CRAWLING_EXT: &str = "crawling";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("marker I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt marker file: {}", .0.display())]
    Corrupt(PathBuf),
}

/// Directory-backed set of in-flight markers
#[derive(Debug, Clone)]
pub struct MarkerSet {
    dir: PathBuf,
}

impl MarkerSet {
    /// Open the marker directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MarkerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `op` on the blocking pool. The methods below touch the filesystem
    /// synchronously; async loops go through here.
    pub async fn blocking<T, F>(&self, op: F) -> Result<T, MarkerError>
    where
        F: FnOnce(&MarkerSet) -> Result<T, MarkerError> + Send + 'static,
        T: Send + 'static,
    {
        let markers = self.clone();
        tokio::task::spawn_blocking(move || op(&markers))
            .await
            .map_err(|e| MarkerError::Io(io::Error::other(e)))?
    }

    fn path(&self, target_id: &TargetId, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", target_id.digest(), ext))
    }

    /// Record a newly dispatched target
    pub fn add(&self, target_id: &TargetId) -> Result<PathBuf, MarkerError> {
        let path = self.path(target_id, QUEUED_EXT);
        fs::write(&path, target_id.as_str())?;
        Ok(path)
    }

    pub fn contains(&self, target_id: &TargetId) -> bool {
        self.path(target_id, QUEUED_EXT).exists() || self.path(target_id, CRAWLING_EXT).exists()
    }

    /// Markers in either state
    pub fn count(&self) -> Result<usize, MarkerError> {
        Ok(self.files(QUEUED_EXT)?.len() + self.files(CRAWLING_EXT)?.len())
    }

    /// Targets dispatched but not yet picked up
    pub fn queued(&self) -> Result<Vec<TargetId>, MarkerError> {
        self.files(QUEUED_EXT)?
            .iter()
            .map(|p| Self::read_id(p))
            .collect()
    }

    /// Targets currently being crawled
    pub fn crawling(&self) -> Result<Vec<TargetId>, MarkerError> {
        self.files(CRAWLING_EXT)?
            .iter()
            .map(|p| Self::read_id(p))
            .collect()
    }

    /// Move the oldest queued marker to the crawling state and return its id
    pub fn claim_next(&self) -> Result<Option<TargetId>, MarkerError> {
        let mut queued = self.files(QUEUED_EXT)?;
        queued.sort_by_key(|p| fs::metadata(p).and_then(|m| m.modified()).ok());

        for path in queued {
            let target_id = match Self::read_id(&path) {
                Ok(id) => id,
                // Claimed by another crawler between listing and reading
                Err(MarkerError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            match fs::rename(&path, path.with_extension(CRAWLING_EXT)) {
                Ok(()) => return Ok(Some(target_id)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    /// Remove the marker for `target_id` in whichever state it is; false if none existed
    pub fn complete(&self, target_id: &TargetId) -> Result<bool, MarkerError> {
        let mut removed = false;
        for ext in [QUEUED_EXT, CRAWLING_EXT] {
            match fs::remove_file(self.path(target_id, ext)) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn files(&self, ext: &str) -> Result<Vec<PathBuf>, MarkerError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == ext) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn read_id(path: &Path) -> Result<TargetId, MarkerError> {
        let content = fs::read_to_string(path)?;
        let id = TargetId::from(content.trim());
        if id.is_empty() {
            return Err(MarkerError::Corrupt(path.to_path_buf()));
        }
        Ok(id)
    }
}

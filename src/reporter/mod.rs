//! Spool-directory uploader
//!
//! The local crawler writes its results as JSON files into a spool directory:
//!
//! - `*.discovered.json`: a [`DiscoveryReport`] for one crawled source
//! - `*.content.json`: a [`ContentReport`] with harvested items
//!
//! Each pass validates every spool file and uploads it to the coordinator
//! with bounded retry. Delivered files are deleted, or renamed to
//! `*.processed` when `keep_processed` is set. A delivered discovery report
//! also clears the dispatcher's in-flight marker for its source. Payloads
//! that can never be accepted are renamed to `*.invalid`; everything else
//! stays in the spool for the next pass.

pub mod validate;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::coordinator::{
    ClientError, ContentReport, CoordinatorClient, DiscoveryAck, DiscoveryReport,
};
use crate::dispatcher::MarkerSet;
use crate::error::{Error, VoyagerErrorTrait};
use crate::metrics;
use crate::storage::BatchWriteReport;
use crate::utils::{with_retry_if, RetryConfig};

pub use validate::{SpoolKind, SpoolPayload, ValidationError};

const PROCESSED_EXT: &str = "processed";
const INVALID_EXT: &str = "invalid";

/// Where the reporter delivers results
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn report_discovered(&self, report: &DiscoveryReport) -> Result<DiscoveryAck, ClientError>;

    async fn report_content(&self, report: &ContentReport) -> Result<BatchWriteReport, ClientError>;
}

#[async_trait]
impl ResultSink for CoordinatorClient {
    async fn report_discovered(&self, report: &DiscoveryReport) -> Result<DiscoveryAck, ClientError> {
        CoordinatorClient::report_discovered(self, report).await
    }

    async fn report_content(&self, report: &ContentReport) -> Result<BatchWriteReport, ClientError> {
        CoordinatorClient::report_content(self, report).await
    }
}

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub spool_dir: PathBuf,

    /// Rename delivered files to `*.processed` instead of deleting them
    pub keep_processed: bool,

    /// Pause between passes, in seconds
    pub interval_secs: u64,

    /// Upload retries per file within one pass
    pub max_retries: u32,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("data/spool"),
            keep_processed: false,
            interval_secs: 5,
            max_retries: 3,
        }
    }
}

impl ReporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What happened to one spool file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Delivered and removed from the spool
    Uploaded,

    /// Malformed or refused by the coordinator; renamed to `*.invalid`
    Invalid,

    /// Could not be delivered; kept for the next pass
    Failed,

    /// Content batch with failed items; kept for the next pass
    Partial,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Invalid => "invalid",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }
}

/// Counts for one pass over the spool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub uploaded: usize,
    pub invalid: usize,
    pub failed: usize,
    pub partial: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Uploaded => self.uploaded += 1,
            FileOutcome::Invalid => self.invalid += 1,
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Partial => self.partial += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.uploaded + self.invalid + self.failed + self.partial
    }
}

pub struct Reporter<S> {
    sink: S,
    markers: Option<MarkerSet>,
    config: ReporterConfig,
    retry: RetryConfig,
}

impl<S: ResultSink> Reporter<S> {
    pub fn new(sink: S, config: ReporterConfig) -> Self {
        let retry = RetryConfig::new(config.max_retries);
        Self {
            sink,
            markers: None,
            config,
            retry,
        }
    }

    /// Clear dispatcher markers when a source's discovery report is delivered
    pub fn with_markers(mut self, markers: MarkerSet) -> Self {
        self.markers = Some(markers);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Spool files awaiting upload, sorted by name
    pub async fn pending_files(&self) -> crate::error::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.config.spool_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && SpoolKind::from_path(&path).is_some() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Process every spool file once
    pub async fn run_once(&self) -> crate::error::Result<PassSummary> {
        let mut summary = PassSummary::default();

        for path in self.pending_files().await? {
            let outcome = self.process_file(&path).await;
            metrics::record_spool_file(outcome.as_str());
            summary.record(outcome);
        }

        if summary.total() > 0 {
            info!(
                uploaded = summary.uploaded,
                invalid = summary.invalid,
                failed = summary.failed,
                partial = summary.partial,
                "Reporter pass complete"
            );
        }
        Ok(summary)
    }

    /// Run passes until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = fs::create_dir_all(&self.config.spool_dir).await {
            warn!(spool_dir = %self.config.spool_dir.display(), error = %e, "Cannot create spool directory");
        }
        info!(spool_dir = %self.config.spool_dir.display(), "Reporter started");

        while !*shutdown.borrow() {
            if let Err(e) = self.run_once().await {
                error!(
                    spool_dir = %self.config.spool_dir.display(),
                    error = %e,
                    category = e.category().as_str(),
                    "Cannot read spool directory"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval()) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Reporter shutting down");
    }

    async fn process_file(&self, path: &Path) -> FileOutcome {
        let Some(kind) = SpoolKind::from_path(path) else {
            return FileOutcome::Failed;
        };

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot read spool file");
                return FileOutcome::Failed;
            }
        };

        let payload = match validate::parse(kind, &bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(file = %path.display(), kind = kind.as_str(), error = %e, "Invalid spool file");
                return self.quarantine(path).await;
            }
        };

        match payload {
            SpoolPayload::Discovered(report) => self.upload_discovered(path, &report).await,
            SpoolPayload::Content(report) => self.upload_content(path, &report).await,
        }
    }

    async fn upload_discovered(&self, path: &Path, report: &DiscoveryReport) -> FileOutcome {
        let result = with_retry_if(
            &self.retry,
            || self.sink.report_discovered(report),
            ClientError::is_transport_fault,
        )
        .await;

        match result {
            Ok(ack) => {
                debug!(
                    target_id = %ack.source,
                    admitted = ack.admitted,
                    source_marked_done = ack.source_marked_done,
                    "Delivered discovery report"
                );
                if let Some(markers) = &self.markers {
                    let source = report.source.target_id.clone();
                    if let Err(e) = markers.blocking(move |m| m.complete(&source)).await {
                        warn!(target_id = %report.source.target_id, error = %e, "Failed to clear marker");
                    }
                }
                self.finish(path).await
            }
            Err(e) => self.upload_failed(path, e).await,
        }
    }

    async fn upload_content(&self, path: &Path, report: &ContentReport) -> FileOutcome {
        let result = with_retry_if(
            &self.retry,
            || self.sink.report_content(report),
            ClientError::is_transport_fault,
        )
        .await;

        match result {
            Ok(written) if written.all_ok() => {
                debug!(target_id = %report.target_id, items = written.succeeded(), "Delivered content");
                self.finish(path).await
            }
            Ok(written) => {
                warn!(
                    file = %path.display(),
                    written = written.succeeded(),
                    failed = written.failed(),
                    "Content batch partially stored, keeping for retry"
                );
                FileOutcome::Partial
            }
            Err(e) => self.upload_failed(path, e).await,
        }
    }

    /// Keep the file for a later pass if retrying can help, quarantine it otherwise
    async fn upload_failed(&self, path: &Path, e: ClientError) -> FileOutcome {
        let err = Error::from(e);
        if err.is_recoverable() {
            warn!(file = %path.display(), error = %err, "Upload failed, keeping for next pass");
            FileOutcome::Failed
        } else {
            warn!(
                file = %path.display(),
                error = %err,
                category = err.category().as_str(),
                "Coordinator refused spool file"
            );
            self.quarantine(path).await
        }
    }

    /// Delete or archive a delivered file
    async fn finish(&self, path: &Path) -> FileOutcome {
        let result = if self.config.keep_processed {
            fs::rename(path, with_appended_ext(path, PROCESSED_EXT)).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Ok(()) => FileOutcome::Uploaded,
            Err(e) if e.kind() == io::ErrorKind::NotFound => FileOutcome::Uploaded,
            Err(e) => {
                // The next pass uploads it again. Admission and completion are
                // idempotent, and the coordinator ignores edges from a report
                // whose source is no longer in progress.
                error!(file = %path.display(), error = %e, "Delivered but could not remove spool file");
                FileOutcome::Uploaded
            }
        }
    }

    async fn quarantine(&self, path: &Path) -> FileOutcome {
        if let Err(e) = fs::rename(path, with_appended_ext(path, INVALID_EXT)).await {
            error!(file = %path.display(), error = %e, "Failed to quarantine spool file");
            return FileOutcome::Failed;
        }
        FileOutcome::Invalid
    }
}

/// `a.discovered.json` -> `a.discovered.json.<ext>`
fn with_appended_ext(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

//! Configuration management for voyager
//!
//! One [`Config`] covers both roles. The coordinator reads `frontier`,
//! `coordinator` and `storage`; workers read `worker`, `dispatcher` and
//! `reporter`. Values come from environment variables or a TOML file and are
//! passed into each component at construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::coordinator::client::ClientConfig;
use crate::coordinator::CoordinatorConfig;
use crate::dispatcher::DispatcherConfig;
use crate::frontier::FrontierConfig;
use crate::reporter::ReporterConfig;
use crate::storage::Stores;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selection and admission limits
    pub frontier: FrontierConfig,

    /// HTTP service settings
    pub coordinator: CoordinatorConfig,

    /// How workers reach the coordinator
    pub worker: WorkerConfig,

    pub dispatcher: DispatcherConfig,

    pub reporter: ReporterConfig,

    /// Record store backend
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker-side connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub coordinator_url: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_url: String::from("http://localhost:33445"),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!("unknown storage backend '{other}' (expected memory or sqlite)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database file for the sqlite backend
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("data/frontier.db"),
        }
    }
}

impl StorageConfig {
    /// Open the configured stores
    pub fn open(&self) -> Result<Stores> {
        match self.backend {
            StorageBackend::Memory => Ok(Stores::in_memory()),
            StorageBackend::Sqlite => Stores::sqlite(&self.sqlite_path)
                .with_context(|| format!("Failed to open SQLite store: {}", self.sqlite_path.display())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Parse `key` from the environment, keeping `default` when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let frontier = FrontierConfig {
            min_revisit_interval_secs: env_or(
                "MIN_REVISIT_INTERVAL",
                defaults.frontier.min_revisit_interval_secs,
            ),
            max_outstanding: env_or("MAX_OUTSTANDING", defaults.frontier.max_outstanding),
            max_claim_attempts: env_or("MAX_CLAIM_ATTEMPTS", defaults.frontier.max_claim_attempts),
            sample_size: env_or("FRONTIER_SAMPLE_SIZE", defaults.frontier.sample_size),
        };

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(v) => v
                .trim()
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid BIND_ADDRESS: {v}"))?,
            Err(_) => defaults.coordinator.bind_address,
        };

        let coordinator = CoordinatorConfig {
            bind_address,
            empty_signal: std::env::var("EMPTY_SIGNAL")
                .unwrap_or_else(|_| defaults.coordinator.empty_signal.clone()),
            ..defaults.coordinator.clone()
        };

        let worker = WorkerConfig {
            coordinator_url: std::env::var("COORDINATOR_URL")
                .unwrap_or_else(|_| defaults.worker.coordinator_url.clone()),
            request_timeout_secs: env_or("REQUEST_TIMEOUT", defaults.worker.request_timeout_secs),
        };

        let dispatcher = DispatcherConfig {
            max_local_inflight: env_or("MAX_LOCAL_INFLIGHT", defaults.dispatcher.max_local_inflight),
            wait_time_secs: env_or("WAIT_TIME", defaults.dispatcher.wait_time_secs),
            relief_time_secs: env_or("RELIEF_TIME", defaults.dispatcher.relief_time_secs),
            marker_dir: std::env::var("MARKER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.dispatcher.marker_dir.clone()),
        };

        let reporter = ReporterConfig {
            spool_dir: std::env::var("SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.reporter.spool_dir.clone()),
            keep_processed: env_bool("KEEP_PROCESSED", defaults.reporter.keep_processed),
            interval_secs: env_or("REPORT_INTERVAL", defaults.reporter.interval_secs),
            max_retries: env_or("REPORT_MAX_RETRIES", defaults.reporter.max_retries),
        };

        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(v) => v.parse::<StorageBackend>()?,
            Err(_) => defaults.storage.backend,
        };
        let storage = StorageConfig {
            backend,
            sqlite_path: std::env::var("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.storage.sqlite_path.clone()),
        };

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| defaults.logging.level.clone()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| defaults.logging.format.clone()),
        };

        Ok(Self {
            frontier,
            coordinator,
            worker,
            dispatcher,
            reporter,
            storage,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.frontier.max_outstanding == 0 {
            anyhow::bail!("max_outstanding must be greater than 0");
        }

        if self.frontier.max_claim_attempts == 0 {
            anyhow::bail!("max_claim_attempts must be greater than 0");
        }

        if self.frontier.sample_size == 0 {
            anyhow::bail!("sample_size must be greater than 0");
        }

        if self.dispatcher.max_local_inflight == 0 {
            anyhow::bail!("max_local_inflight must be greater than 0");
        }

        if self.dispatcher.relief_time_secs == 0 {
            anyhow::bail!("relief_time_secs must be greater than 0");
        }

        self.coordinator
            .validate()
            .context("Invalid coordinator configuration")?;

        let url = url::Url::parse(&self.worker.coordinator_url)
            .with_context(|| format!("Invalid coordinator_url: {}", self.worker.coordinator_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("coordinator_url must use http or https, got {}", url.scheme());
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be text or json, got {}", self.logging.format);
        }

        Ok(())
    }

    /// Client settings for talking to the coordinator
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.worker.coordinator_url.as_str())
            .with_timeout(Duration::from_secs(self.worker.request_timeout_secs))
            .with_empty_signal(self.coordinator.empty_signal.as_str())
    }
}

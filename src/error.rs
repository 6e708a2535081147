//! Unified error handling for the voyager crate
//!
//! Each layer keeps its own error type. [`Error`] wraps them so the binary
//! and other cross-module callers can handle failures uniformly.
//!
//! # Architecture
//!
//! - [`VoyagerErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use voyager::error::{Error, VoyagerErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::coordinator::config::ConfigError as CoordinatorConfigError;
pub use crate::coordinator::{ClientError, ServerError, ServiceError};
pub use crate::dispatcher::MarkerError;
pub use crate::reporter::ValidationError;
pub use crate::storage::StoreError;

/// Common trait for voyager error types
pub trait VoyagerErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Coordinator unreachable, HTTP failures
    Network,
    /// Record store, marker and spool I/O
    Storage,
    /// Lost races and invalid status transitions
    Scheduling,
    /// Configuration and validation errors
    Config,
    /// Malformed payloads
    Parsing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Scheduling => "scheduling",
            Self::Config => "config",
            Self::Parsing => "parsing",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the voyager crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Marker error: {0}")]
    Marker(#[from] MarkerError),

    #[error("Invalid spool payload: {0}")]
    Validation(#[from] ValidationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VoyagerErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => matches!(e, StoreError::Conflict { .. } | StoreError::Backend(_)),
            Self::Service(ServiceError::InvalidRequest(_)) => false,
            Self::Service(ServiceError::Store(e)) => {
                matches!(e, StoreError::Conflict { .. } | StoreError::Backend(_))
            }
            Self::Client(e) => e.is_transport_fault(),
            Self::Server(ServerError::BindError { .. }) => true,
            Self::Server(_) => false,
            Self::Marker(MarkerError::Io(_)) => true,
            Self::Marker(MarkerError::Corrupt(_)) => false,
            Self::Validation(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(e) | Self::Service(ServiceError::Store(e)) => match e {
                StoreError::Conflict { .. }
                | StoreError::AlreadyExists(_)
                | StoreError::InvalidTransition { .. } => ErrorCategory::Scheduling,
                StoreError::NotFound(_) | StoreError::Backend(_) => ErrorCategory::Storage,
            },
            Self::Service(ServiceError::InvalidRequest(_)) => ErrorCategory::Parsing,
            Self::Client(ClientError::ParseError(_)) => ErrorCategory::Parsing,
            Self::Client(_) => ErrorCategory::Network,
            Self::Server(ServerError::ConfigError(_)) => ErrorCategory::Config,
            Self::Server(_) => ErrorCategory::Network,
            Self::Marker(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Validation(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<CoordinatorConfigError> for Error {
    fn from(err: CoordinatorConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;

/// Default port of the coordinator service
pub const DEFAULT_PORT: u16 = 33445;

/// Default sentinel returned when there is no work
pub const DEFAULT_EMPTY_SIGNAL: &str = "wait_pls";

/// Priority given to operator-injected targets
pub const DEFAULT_INJECT_PRIORITY: i64 = 100;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

/// Configuration for the Coordinator server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Sentinel sent instead of a target id when the frontier is empty
    pub empty_signal: String,

    /// Priority for targets injected without an explicit one
    pub inject_priority: i64,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            empty_signal: DEFAULT_EMPTY_SIGNAL.to_string(),
            inject_priority: DEFAULT_INJECT_PRIORITY,
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let signal = &self.empty_signal;
        if signal.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "empty_signal".to_string(),
                reason: "sentinel must not be empty".to_string(),
            });
        }
        // Workers compare the sentinel against target ids verbatim
        if signal.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "empty_signal".to_string(),
                reason: format!("sentinel {signal:?} contains whitespace"),
            });
        }

        Ok(())
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    bind_address: Option<SocketAddr>,
    empty_signal: Option<String>,
    inject_priority: Option<i64>,
    enable_cors: Option<bool>,
    enable_request_logging: Option<bool>,
}

impl CoordinatorConfigBuilder {
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            reason: format!("Invalid address: {}", addr),
        })?);
        Ok(self)
    }

    pub fn empty_signal(mut self, signal: impl Into<String>) -> Self {
        self.empty_signal = Some(signal.into());
        self
    }

    pub fn inject_priority(mut self, priority: i64) -> Self {
        self.inject_priority = Some(priority);
        self
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        let config = CoordinatorConfig {
            bind_address: self.bind_address.unwrap_or_else(default_bind_address),
            empty_signal: self
                .empty_signal
                .unwrap_or_else(|| DEFAULT_EMPTY_SIGNAL.to_string()),
            inject_priority: self.inject_priority.unwrap_or(DEFAULT_INJECT_PRIORITY),
            enable_cors: self.enable_cors.unwrap_or(true),
            enable_request_logging: self.enable_request_logging.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },
}

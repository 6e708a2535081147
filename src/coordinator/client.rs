//! Coordinator client for worker processes
//!
//! Each call is a single HTTP attempt. Callers decide how to react to
//! failures: the dispatcher backs off, the reporter retries transport faults
//! with [`crate::utils::with_retry_if`].

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

use crate::frontier::FrontierStats;
use crate::models::{TargetId, TargetRecord};
use crate::storage::BatchWriteReport;

use super::api::{ApiResponse, HealthResponse, InjectRequest, NextResponse, StatsResponse};
use super::config::DEFAULT_EMPTY_SIGNAL;
use super::service::{ContentReport, DiscoveryAck, DiscoveryReport, InjectAck, NextTarget};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the coordinator client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordinator server URL
    pub coordinator_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// A target id equal to this is treated as "no work"
    pub empty_signal: String,
}

impl ClientConfig {
    pub fn new(coordinator_url: impl Into<String>) -> Self {
        Self {
            coordinator_url: coordinator_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            empty_signal: DEFAULT_EMPTY_SIGNAL.to_string(),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_empty_signal(mut self, signal: impl Into<String>) -> Self {
        self.empty_signal = signal.into();
        self
    }
}

// ============================================================================
// Coordinator Client
// ============================================================================

/// Client for communicating with the Coordinator server
pub struct CoordinatorClient {
    config: ClientConfig,
    base_url: Url,
    http_client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.coordinator_url)
            .map_err(|e| ClientError::InitError(format!("{}: {e}", config.coordinator_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InitError(format!(
                "{} cannot carry a path",
                config.coordinator_url
            )));
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask for the next target
    pub async fn next_target(&self) -> Result<NextTarget, ClientError> {
        let response: NextResponse = self.get_json(&["api", "next"]).await?;

        Ok(match response {
            NextResponse::Target { target_id } if target_id.as_str() != self.config.empty_signal => {
                NextTarget::Target(target_id)
            }
            NextResponse::Target { .. } | NextResponse::Wait { .. } => NextTarget::Wait,
        })
    }

    pub async fn report_discovered(&self, report: &DiscoveryReport) -> Result<DiscoveryAck, ClientError> {
        self.post_json(&["api", "discovered"], report).await
    }

    pub async fn report_content(&self, report: &ContentReport) -> Result<BatchWriteReport, ClientError> {
        self.post_json(&["api", "content"], report).await
    }

    pub async fn inject(&self, request: &InjectRequest) -> Result<InjectAck, ClientError> {
        self.post_json(&["api", "targets"], request).await
    }

    /// Fetch one record; `None` if the coordinator does not know it
    pub async fn target(&self, target_id: &TargetId) -> Result<Option<TargetRecord>, ClientError> {
        match self.get_json(&["api", "targets", target_id.as_str()]).await {
            Ok(record) => Ok(Some(record)),
            Err(ClientError::HttpError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn stats(&self) -> Result<(FrontierStats, u64), ClientError> {
        let response: StatsResponse = self.get_json(&["api", "stats"]).await?;
        Ok((response.frontier, response.uptime_secs))
    }

    /// Check coordinator health
    pub async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        let health: HealthResponse = self.get_json(&["api", "health"]).await?;
        Ok(HealthStatus {
            healthy: health.status == "healthy",
            version: health.version,
            uptime_secs: health.uptime_secs,
        })
    }

    /// Endpoint URL with each segment percent-encoded, so ids may contain
    /// `/`, `?`, `#` or `%`
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InitError(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let response = self
            .http_client
            .get(self.url(segments)?)
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Self::unwrap_envelope(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .http_client
            .post(self.url(segments)?)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Self::unwrap_envelope(response).await
    }

    /// Turn an HTTP response into the `data` of its [`ApiResponse`] envelope
    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiResponse<serde_json::Value>>().await {
                Ok(body) => body.error.unwrap_or_default(),
                Err(_) => String::new(),
            };
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))?;

        match (body.success, body.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(ClientError::InvalidResponse(
                body.error.unwrap_or_else(|| "missing data".to_string()),
            )),
        }
    }
}

/// Health status from coordinator
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// Client Errors
// ============================================================================

/// Client errors
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Initialization error
    InitError(String),

    /// Network error
    NetworkError(String),

    /// HTTP error
    HttpError { status: u16, message: String },

    /// Parse error
    ParseError(String),

    /// Invalid response
    InvalidResponse(String),
}

impl ClientError {
    /// Whether the coordinator could not be reached or failed on its side.
    ///
    /// 4xx responses are not transport faults: the request itself was refused.
    pub fn is_transport_fault(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::ParseError(_) | Self::InvalidResponse(_) => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::InitError(_) => false,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitError(msg) => write!(f, "Initialization error: {msg}"),
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::HttpError { status, message } => {
                write!(f, "HTTP error ({status}): {message}")
            }
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_creation() {
        let config = ClientConfig::new("http://localhost:33445/");

        assert_eq!(config.coordinator_url, "http://localhost:33445");
        assert_eq!(config.empty_signal, "wait_pls");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_client_config_builders() {
        let config = ClientConfig::new("http://localhost:33445")
            .with_timeout(Duration::from_secs(30))
            .with_empty_signal("later");

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.empty_signal, "later");
    }

    #[test]
    fn test_client_creation() {
        let client = CoordinatorClient::new(ClientConfig::new("http://localhost:33445"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = CoordinatorClient::new(ClientConfig::new("not a url"));
        assert!(matches!(result, Err(ClientError::InitError(_))));
    }

    #[test]
    fn test_target_ids_are_encoded_as_one_segment() {
        let client = CoordinatorClient::new(ClientConfig::new("http://localhost:33445")).unwrap();

        let url = client.url(&["api", "targets", "a/b?c#d%e"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:33445/api/targets/a%2Fb%3Fc%23d%25e");

        let nested = CoordinatorClient::new(ClientConfig::new("http://proxy/voyager/")).unwrap();
        assert_eq!(
            nested.url(&["api", "next"]).unwrap().as_str(),
            "http://proxy/voyager/api/next"
        );
    }

    #[test]
    fn test_transport_fault_classification() {
        assert!(ClientError::NetworkError("refused".into()).is_transport_fault());
        assert!(ClientError::HttpError {
            status: 503,
            message: String::new()
        }
        .is_transport_fault());
        assert!(!ClientError::HttpError {
            status: 400,
            message: String::new()
        }
        .is_transport_fault());
    }
}

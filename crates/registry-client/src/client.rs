//! Market index client
//!
//! Performs exactly one GET per `fetch_catalog` call. No retries: the
//! updater's poll timer is the retry loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::RegistryError;
use crate::Result;

/// Default market index.
pub const DEFAULT_ENDPOINT: &str = "https://registry.koishi.chat/index.json";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Registry client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Market index URL
    pub endpoint: String,
    /// Whole-request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,
    /// User agent sent with each request
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("updater-registry-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RegistryConfig {
    /// Create config for a specific endpoint
    pub fn new(endpoint: &str) -> Self {
        RegistryConfig {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// HTTP client for one market index
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http_client: reqwest::Client,
}

impl RegistryClient {
    /// Create a new client, validating the endpoint.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
            return Err(RegistryError::InvalidEndpoint(config.endpoint));
        }

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder.build()?;

        Ok(RegistryClient {
            config,
            http_client,
        })
    }

    /// Configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Download and decode the market index.
    pub async fn fetch_catalog(&self) -> Result<Catalog> {
        let url = &self.config.endpoint;
        debug!(url = %url, "fetching market index");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let body = response.bytes().await?;
        let catalog: Catalog = serde_json::from_slice(&body)?;
        debug!(url = %url, entries = catalog.objects.len(), "market index decoded");
        Ok(catalog)
    }
}

//! Error types for registry-client

use thiserror::Error;

/// Errors that can occur while fetching a catalog index
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Endpoint is not an http(s) URL
    #[error("Invalid registry endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport-level failure (DNS, connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Body was not a catalog document
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Http(err.to_string())
    }
}

//! Domain-level error taxonomy for the updater.
//!
//! Structural failures (fetch, access, configuration, persistence) are
//! errors. Ownership mismatches are not: they come back as
//! [`Status::InvalidToken`](crate::registry::Status) so callers branch on a
//! value.

use registry_client::RegistryError;

/// Catalog retrieval or decode failure. Aborts the cycle that raised it.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("catalog transport error: {0}")]
    Transport(String),

    #[error("catalog endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("catalog document could not be decoded: {0}")]
    Decode(String),
}

impl From<RegistryError> for FetchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Status { status, .. } => FetchError::Status { status },
            RegistryError::Json(e) => FetchError::Decode(e.to_string()),
            RegistryError::Http(msg) => FetchError::Transport(msg),
            RegistryError::InvalidEndpoint(endpoint) => {
                FetchError::Transport(format!("invalid endpoint {endpoint}"))
            }
        }
    }
}

/// Updater domain errors.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("register for {short_name} already exists, use force to replace it")]
    AlreadyRegistered { short_name: String },

    #[error("no registration for {short_name}")]
    NotFound { short_name: String },

    #[error("access denied: policy for {short_name} may only be changed with the internal access key")]
    AccessDenied { short_name: String },

    #[error("package {short_name} is not in the observed catalog")]
    NotInCatalog { short_name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("state error: {0}")]
    State(#[from] updater_state::StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for updater domain operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

//! Error types for updater-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Reading or writing the state file failed
    #[error("State file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state document could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The state file exists but is not a valid document
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// A background task performing blocking I/O was lost
    #[error("State task failed: {0}")]
    Task(String),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for StateError {
    fn from(err: tokio::task::JoinError) -> Self {
        StateError::Task(err.to_string())
    }
}

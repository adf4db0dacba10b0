//! Updater-State: persistence hook for the package catalog updater
//!
//! The updater engine hands this layer a JSON document describing what it
//! has observed (the last catalog snapshot and granted policies) and reads it
//! back on start.
//!
//! ## Key Components
//!
//! - `StateStore`: async save/load seam
//! - `FsStateStore`: atomic JSON file under the data directory
//! - `fakes::MemoryStateStore`: in-memory store for tests

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StateError;
pub use fs_store::{FsStateStore, STATE_DIR, STATE_FILE};
pub use storage_traits::{StateResult, StateStore};

/// Result type for updater-state operations
pub type Result<T> = std::result::Result<T, StateError>;

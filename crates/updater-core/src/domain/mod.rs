//! Domain models for the updater.
//!
//! - `PackageInfo` / `Snapshot`: one observed catalog
//! - `ChangeEvent`: one difference between two snapshots
//! - `UpdaterError` / `FetchError`: error taxonomy

pub mod error;
pub mod event;
pub mod snapshot;

pub use error::{FetchError, Result, UpdaterError};
pub use event::{ChangeEvent, ChangeKind};
pub use snapshot::{PackageInfo, Snapshot};

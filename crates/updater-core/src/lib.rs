//! Updater Core Library
//!
//! Polls a package catalog, diffs each fetch against the previous one and
//! dispatches new/update/delete events to registered subscribers, batching
//! the installs they request into one installer call per cycle.
//!
//! ## Key Components
//!
//! - [`UpdaterEngine`]: lifecycle, poll timer, `check_update`, `install`
//! - [`RegistrationTable`]: per-name callbacks, ownership tokens, policies
//! - [`Dispatcher`]: permission-gated callback invocation
//! - [`InstallQueue`]: per-cycle batching of install requests
//! - [`diff_snapshots`]: pure snapshot diff

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod fetcher;
pub mod installer;
pub mod metrics;
pub mod obs;
pub mod persist;
pub mod queue;
pub mod registry;
pub mod telemetry;

pub use config::UpdaterConfig;
pub use diff::diff_snapshots;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use domain::{
    ChangeEvent, ChangeKind, FetchError, PackageInfo, Result, Snapshot, UpdaterError,
};
pub use engine::{CycleReport, InstallOutcome, UpdaterEngine};
pub use fetcher::{snapshot_from_catalog, CatalogFetcher, RegistryFetcher};
pub use installer::{CommandInstaller, DryRunInstaller, InstallStatus, Installer};
pub use metrics::METRICS;
pub use persist::PersistedState;
pub use queue::{InstallQueue, InstallTask};
pub use registry::{
    AccessKey, Callbacks, Policy, PolicyPatch, RegistrationInfo, RegistrationTable, Status,
    TokenOutOfRange, VerifyToken,
};

pub use telemetry::init_tracing;

pub use updater_state::{FsStateStore, StateStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

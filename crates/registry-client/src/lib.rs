//! Registry-Client: market index access for the package catalog updater
//!
//! Fetches the plugin market index over HTTP and decodes the parts of it the
//! updater needs (short name, full package name, version). Reducing the index
//! to a snapshot is the engine's job; this crate only speaks the wire format.

pub mod catalog;
pub mod client;
pub mod error;

pub use catalog::{Catalog, CatalogEntry, PackageRecord};
pub use client::{RegistryClient, RegistryConfig, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
pub use error::RegistryError;

/// Result type for registry-client operations
pub type Result<T> = std::result::Result<T, RegistryError>;

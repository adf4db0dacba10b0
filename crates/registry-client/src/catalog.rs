//! Wire types of the market index document.
//!
//! Only the fields the updater reads are modelled; everything else in the
//! index (download counts, ratings, manifests) is ignored. Identity fields
//! are optional because the index is externally controlled and entries with
//! holes must be skippable rather than fatal.

use serde::{Deserialize, Serialize};

/// Top-level market index: `{ "objects": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub objects: Vec<CatalogEntry>,
}

/// One plugin listing in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Short plugin name, e.g. `"market"`.
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub package: Option<PackageRecord>,
}

/// Package identity of a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Full package name, e.g. `"@koishijs/plugin-market"`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl CatalogEntry {
    /// `(shortname, full name, version)` when all three are present.
    pub fn identity(&self) -> Option<(&str, &str, &str)> {
        let package = self.package.as_ref()?;
        Some((
            self.shortname.as_deref()?,
            package.name.as_deref()?,
            package.version.as_deref()?,
        ))
    }
}

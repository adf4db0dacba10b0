//! Catalog snapshot: short name → package identity at one fetch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity and version of one catalog package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Market short name, e.g. `"market"`.
    pub short_name: String,

    /// Full package name, e.g. `"@koishijs/plugin-market"`.
    pub full_name: String,

    /// Published version string. Compared for equality only.
    pub version: String,
}

impl PackageInfo {
    pub fn new(
        short_name: impl Into<String>,
        full_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            full_name: full_name.into(),
            version: version.into(),
        }
    }
}

/// One observed catalog, keyed by short name.
///
/// Built once per fetch. Keys are unique by construction: when the source
/// catalog lists a short name twice, the later listing wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    packages: BTreeMap<String, PackageInfo>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from packages in catalog order (last writer wins).
    pub fn from_packages(packages: impl IntoIterator<Item = PackageInfo>) -> Self {
        let mut snapshot = Self::new();
        for package in packages {
            snapshot.insert(package);
        }
        snapshot
    }

    /// Insert a package, replacing any earlier listing with the same short name.
    pub fn insert(&mut self, package: PackageInfo) {
        if let Some(replaced) = self.packages.insert(package.short_name.clone(), package) {
            debug!(
                short_name = %replaced.short_name,
                replaced_version = %replaced.version,
                "duplicate catalog listing, keeping the later one"
            );
        }
    }

    pub fn get(&self, short_name: &str) -> Option<&PackageInfo> {
        self.packages.get(short_name)
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.packages.contains_key(short_name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Short names in sorted order.
    pub fn short_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageInfo> {
        self.packages.values()
    }
}

impl FromIterator<PackageInfo> for Snapshot {
    fn from_iter<I: IntoIterator<Item = PackageInfo>>(iter: I) -> Self {
        Self::from_packages(iter)
    }
}

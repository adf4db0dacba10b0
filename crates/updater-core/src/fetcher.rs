//! Snapshot fetching.
//!
//! [`CatalogFetcher`] is the seam between the engine and whatever transport
//! produces a catalog. [`RegistryFetcher`] is the HTTP implementation backed
//! by `registry-client`.

use async_trait::async_trait;
use tracing::{debug, instrument};

use registry_client::{Catalog, RegistryClient, RegistryConfig};

use crate::domain::{FetchError, PackageInfo, Snapshot};

/// Produces the current catalog snapshot.
///
/// One call is one network read. Implementations do not retry; a failed fetch
/// aborts only the cycle that asked for it.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

/// Reduce a market index to a snapshot.
///
/// Entries missing any identity field (short name, package name, version) are
/// skipped. Duplicate short names resolve to the later entry.
pub fn snapshot_from_catalog(catalog: &Catalog) -> Snapshot {
    let mut skipped = 0usize;
    let snapshot = catalog
        .objects
        .iter()
        .filter_map(|entry| {
            let identity = entry.identity();
            if identity.is_none() {
                skipped += 1;
            }
            identity
        })
        .map(|(short_name, full_name, version)| PackageInfo::new(short_name, full_name, version))
        .collect::<Snapshot>();

    if skipped > 0 {
        debug!(skipped, "catalog entries without identity fields skipped");
    }
    snapshot
}

/// HTTP catalog fetcher.
pub struct RegistryFetcher {
    client: RegistryClient,
}

impl RegistryFetcher {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    /// Build a fetcher for `endpoint` with the given request timeout.
    pub fn for_endpoint(endpoint: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = RegistryClient::new(RegistryConfig::new(endpoint).with_timeout(timeout_secs))?;
        Ok(Self::new(client))
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

#[async_trait]
impl CatalogFetcher for RegistryFetcher {
    #[instrument(skip(self), fields(endpoint = %self.client.endpoint()))]
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let catalog = self.client.fetch_catalog().await?;
        Ok(snapshot_from_catalog(&catalog))
    }
}

//! In-memory fakes for the fetcher and installer (testing only)
//!
//! `ScriptedFetcher` replays a script of snapshots and failures, then keeps
//! returning the last snapshot it served. `RecordingInstaller` records every
//! batch it receives and can be held mid-install to exercise overlap.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::domain::{FetchError, PackageInfo, Snapshot};
use crate::fetcher::CatalogFetcher;
use crate::installer::{InstallStatus, Installer};

/// Build a snapshot from `(short_name, version)` pairs with
/// `koishi-plugin-<short_name>` full names.
pub fn snapshot_of(entries: &[(&str, &str)]) -> Snapshot {
    entries
        .iter()
        .map(|(name, version)| PackageInfo::new(*name, format!("koishi-plugin-{name}"), *version))
        .collect()
}

enum Step {
    Serve(Snapshot),
    Fail(FetchError),
}

/// Fetcher driven by a script.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Snapshot>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a snapshot to serve.
    pub fn push(&self, snapshot: Snapshot) -> &Self {
        self.script.lock().unwrap().push_back(Step::Serve(snapshot));
        self
    }

    /// Queue a failed fetch.
    pub fn push_error(&self, error: FetchError) -> &Self {
        self.script.lock().unwrap().push_back(Step::Fail(error));
        self
    }

    /// Number of `fetch` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Serve(snapshot)) => {
                *self.last.lock().unwrap() = snapshot.clone();
                Ok(snapshot)
            }
            Some(Step::Fail(error)) => Err(error),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

/// One batch the installer was asked to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    pub packages: BTreeMap<String, String>,
    pub strict: bool,
}

/// Installer that records its calls.
pub struct RecordingInstaller {
    calls: Mutex<Vec<InstallCall>>,
    status: InstallStatus,
    called: Notify,
    gate: Option<Semaphore>,
}

impl Default for RecordingInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingInstaller {
    /// Records calls and reports success.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: InstallStatus::Installed,
            called: Notify::new(),
            gate: None,
        }
    }

    /// Records calls and reports failure with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            status: InstallStatus::Failed {
                reason: reason.to_string(),
            },
            ..Self::new()
        }
    }

    /// Each call blocks until [`RecordingInstaller::release`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Let one blocked call finish.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Wait until a call has been recorded.
    pub async fn wait_until_called(&self) {
        self.called.notified().await;
    }

    pub fn calls(&self) -> Vec<InstallCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(&self, packages: &BTreeMap<String, String>, strict: bool) -> InstallStatus {
        self.calls.lock().unwrap().push(InstallCall {
            packages: packages.clone(),
            strict,
        });
        self.called.notify_one();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_repeat_last() {
        let fetcher = ScriptedFetcher::new();
        fetcher
            .push(snapshot_of(&[("a", "1")]))
            .push_error(FetchError::Status { status: 500 });

        assert_eq!(fetcher.fetch().await.unwrap().len(), 1);
        assert!(fetcher.fetch().await.is_err());
        assert_eq!(fetcher.fetch().await.unwrap(), snapshot_of(&[("a", "1")]));
        assert_eq!(fetcher.fetch_count(), 3);
    }
}

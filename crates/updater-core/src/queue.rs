//! Install task queue.
//!
//! Dispatch appends authorized tasks; the cycle flushes them as one batched
//! installer call. Tasks appended while a flush is awaiting the installer
//! land in the fresh queue and go out with the next flush.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::installer::{InstallStatus, Installer};
use crate::metrics::METRICS;
use crate::obs::emit_install_flushed;

/// One queued install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTask {
    pub full_name: String,
    pub version: String,
}

impl InstallTask {
    pub fn new(full_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            version: version.into(),
        }
    }
}

/// FIFO of pending install tasks with single-flight flushing.
pub struct InstallQueue {
    pending: Mutex<VecDeque<InstallTask>>,
    flushing: tokio::sync::Mutex<()>,
    installer: Arc<dyn Installer>,
    strict: bool,
}

impl InstallQueue {
    pub fn new(installer: Arc<dyn Installer>, strict: bool) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            flushing: tokio::sync::Mutex::new(()),
            installer,
            strict,
        }
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<InstallTask>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, task: InstallTask) {
        debug!(package = %task.full_name, version = %task.version, "install task queued");
        self.pending().push_back(task);
        METRICS.inc_installs_queued();
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queued tasks in FIFO order.
    pub fn snapshot(&self) -> Vec<InstallTask> {
        self.pending().iter().cloned().collect()
    }

    /// Drain the queue into one installer call.
    ///
    /// Returns `None` without calling the installer when nothing is queued.
    /// When one package was queued twice, the later version wins.
    pub async fn flush(&self) -> Option<InstallStatus> {
        let _flight = self.flushing.lock().await;

        let batch: Vec<InstallTask> = self.pending().drain(..).collect();
        if batch.is_empty() {
            return None;
        }

        let mut packages = BTreeMap::new();
        for task in &batch {
            if let Some(earlier) = packages.insert(task.full_name.clone(), task.version.clone()) {
                debug!(
                    package = %task.full_name,
                    superseded = %earlier,
                    version = %task.version,
                    "install task superseded within batch"
                );
            }
        }

        let status = self.installer.install(&packages, self.strict).await;
        emit_install_flushed(packages.len(), status.is_success());
        Some(status)
    }
}

impl std::fmt::Debug for InstallQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallQueue")
            .field("pending", &self.len())
            .field("strict", &self.strict)
            .finish()
    }
}

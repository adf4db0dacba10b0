//! The updater engine.
//!
//! One instance owns the previous snapshot, the registration table, the
//! install queue and the poll timer. A cycle is
//! fetch → diff → dispatch all → flush → swap. Cycles are serialized by a
//! cycle lock. The snapshot lock is only held to read or swap the snapshot,
//! never across subscriber callbacks, so a callback may call back into
//! [`UpdaterEngine::install`].
//!
//! ```ignore
//! let engine = UpdaterEngine::from_config(config)?;
//! let token = engine.register("market", callbacks, false)?;
//! engine.start().await?;
//! // ...
//! engine.stop().await;
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use updater_state::{FsStateStore, StateStore};

use crate::config::UpdaterConfig;
use crate::diff::diff_snapshots;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::domain::{ChangeEvent, Result, Snapshot, UpdaterError};
use crate::fetcher::{CatalogFetcher, RegistryFetcher};
use crate::installer::{CommandInstaller, DryRunInstaller, InstallStatus, Installer};
use crate::metrics::METRICS;
use crate::obs::{
    cycle_span, emit_change_detected, emit_cycle_finished, emit_cycle_started, emit_fetch_failed,
};
use crate::persist::PersistedState;
use crate::queue::{InstallQueue, InstallTask};
use crate::registry::{
    AccessKey, Callbacks, Policy, PolicyPatch, RegistrationInfo, RegistrationTable, Status,
    VerifyToken,
};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: String,
    /// No previous snapshot existed; this fetch became the baseline and no
    /// events were produced.
    pub baseline: bool,
    pub changes: Vec<ChangeEvent>,
    /// One outcome per entry of `changes`, same order.
    pub outcomes: Vec<DispatchOutcome>,
    /// `None` when nothing was queued.
    pub install: Option<InstallStatus>,
    pub duration_ms: u64,
}

/// Result of an explicit [`UpdaterEngine::install`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The installer ran; its status is attached.
    Flushed { status: InstallStatus },
    InvalidToken,
    /// The registration's policy does not allow installs.
    NotPermitted,
}

struct EngineInner {
    config: UpdaterConfig,
    fetcher: Arc<dyn CatalogFetcher>,
    table: Arc<RegistrationTable>,
    queue: Arc<InstallQueue>,
    dispatcher: Dispatcher,
    store: Option<Arc<dyn StateStore>>,
    previous: Mutex<Option<Snapshot>>,
    cycling: Mutex<()>,
    saving: Mutex<()>,
}

struct Running {
    shutdown: CancellationToken,
    timer: JoinHandle<()>,
    persister: Option<JoinHandle<()>>,
}

/// Polling, diffing and dispatching engine.
pub struct UpdaterEngine {
    inner: Arc<EngineInner>,
    access_key: AccessKey,
    running: Mutex<Option<Running>>,
}

impl UpdaterEngine {
    /// Build an engine from its collaborators. `store` enables persistence.
    pub fn new(
        config: UpdaterConfig,
        fetcher: Arc<dyn CatalogFetcher>,
        installer: Arc<dyn Installer>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        let access_key = AccessKey::generate();
        let table = Arc::new(RegistrationTable::new(access_key.clone()));
        let queue = Arc::new(InstallQueue::new(installer, config.strict_install));
        let dispatcher = Dispatcher::new(
            Arc::clone(&table),
            Arc::clone(&queue),
            config.enable_permission_system,
        )
        .with_callback_timeout(config.callback_timeout());

        Self {
            inner: Arc::new(EngineInner {
                config,
                fetcher,
                table,
                queue,
                dispatcher,
                store,
                previous: Mutex::new(None),
                cycling: Mutex::new(()),
                saving: Mutex::new(()),
            }),
            access_key,
            running: Mutex::new(None),
        }
    }

    /// Build the production engine: HTTP fetcher, command or dry-run
    /// installer, and a filesystem store under `data_dir` when `persist` is on.
    pub fn from_config(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;

        let fetcher = RegistryFetcher::for_endpoint(
            &config.catalog_endpoint,
            config.request_timeout_secs,
        )?;

        let installer: Arc<dyn Installer> = match config.installer_command.as_deref() {
            Some(line) => {
                let installer = CommandInstaller::from_command_line(line).ok_or_else(|| {
                    UpdaterError::InvalidConfig("installer_command is empty".to_string())
                })?;
                Arc::new(installer)
            }
            None => Arc::new(DryRunInstaller),
        };

        let store: Option<Arc<dyn StateStore>> = if config.persist {
            Some(Arc::new(FsStateStore::new(&config.data_dir)))
        } else {
            None
        };

        Ok(Self::new(config, Arc::new(fetcher), installer, store))
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.inner.config
    }

    /// The internal key required by [`UpdaterEngine::update_policy`].
    ///
    /// Hand it only to the administrative surface, never to subscribers.
    pub fn access_key(&self) -> AccessKey {
        self.access_key.clone()
    }

    // --- lifecycle -------------------------------------------------------

    /// Load persisted state and start the poll timer.
    ///
    /// The first tick fires immediately. Without a persisted snapshot it
    /// establishes the baseline. Calling `start` on a running engine is a
    /// no-op. An invalid configuration is rejected before anything is spawned.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("updater already running");
            return Ok(());
        }

        self.inner.config.validate()?;

        self.load_state().await?;

        let shutdown = CancellationToken::new();
        let timer = tokio::spawn(Arc::clone(&self.inner).run_timer(shutdown.clone()));
        let persister = self
            .inner
            .store
            .is_some()
            .then(|| tokio::spawn(Arc::clone(&self.inner).run_persister(shutdown.clone())));

        info!(
            poll_interval_ms = self.inner.config.poll_interval_ms,
            endpoint = %self.inner.config.catalog_endpoint,
            persist = self.inner.store.is_some(),
            "updater started"
        );

        *running = Some(Running {
            shutdown,
            timer,
            persister,
        });
        Ok(())
    }

    /// Cancel the timer and wait for an in-flight cycle to finish.
    ///
    /// State is saved one last time when persistence is on. Stopping a
    /// stopped engine is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.shutdown.cancel();
        if let Err(e) = running.timer.await {
            warn!(error = %e, "poll timer task ended abnormally");
        }
        if let Some(persister) = running.persister {
            if let Err(e) = persister.await {
                warn!(error = %e, "persistence task ended abnormally");
            }
        }

        self.inner.persist_current().await;
        METRICS.flush();
        info!("updater stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Restore the persisted snapshot and policies, if any.
    ///
    /// Called by `start`; exposed for one-shot tools that run
    /// [`UpdaterEngine::check_update`] without the timer.
    pub async fn load_state(&self) -> Result<()> {
        let Some(store) = &self.inner.store else {
            return Ok(());
        };
        let Some(doc) = store.load().await? else {
            debug!("no persisted updater state");
            return Ok(());
        };

        let state = PersistedState::from_document(doc)?;
        info!(
            packages = state.snapshot.as_ref().map(Snapshot::len).unwrap_or(0),
            policies = state.policies.len(),
            "persisted updater state loaded"
        );

        self.inner.table.restore_policies(state.policies);
        if let Some(snapshot) = state.snapshot {
            *self.inner.previous.lock().await = Some(snapshot);
        }
        Ok(())
    }

    // --- cycles ----------------------------------------------------------

    /// Run a full cycle now.
    ///
    /// Serialized with the timer: the changes returned here are dispatched
    /// once and never reported again by another cycle.
    pub async fn check_update(&self) -> Result<CycleReport> {
        self.inner.run_cycle("manual").await
    }

    /// Install the package registered under `short_name` at the version in
    /// the previous snapshot.
    ///
    /// Requires the registration's token and, with the permission system
    /// on, a policy allowing installs.
    pub async fn install(&self, short_name: &str, token: VerifyToken) -> Result<InstallOutcome> {
        if self.inner.table.check_token(short_name, token)? == Status::InvalidToken {
            return Ok(InstallOutcome::InvalidToken);
        }

        let allowed = !self.inner.config.enable_permission_system
            || self
                .inner
                .table
                .policy(short_name)
                .is_some_and(|policy| policy.allow_install);
        if !allowed {
            return Ok(InstallOutcome::NotPermitted);
        }

        let task = {
            let previous = self.inner.previous.lock().await;
            let package = previous
                .as_ref()
                .and_then(|snapshot| snapshot.get(short_name))
                .ok_or_else(|| UpdaterError::NotInCatalog {
                    short_name: short_name.to_string(),
                })?;
            InstallTask::new(package.full_name.clone(), package.version.clone())
        };

        self.inner.queue.enqueue(task);
        let status = self
            .inner
            .queue
            .flush()
            .await
            .unwrap_or(InstallStatus::Installed);
        Ok(InstallOutcome::Flushed { status })
    }

    /// Copy of the previous snapshot.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.inner.previous.lock().await.clone()
    }

    // --- registrations ---------------------------------------------------

    pub fn register(
        &self,
        short_name: &str,
        callbacks: Callbacks,
        force: bool,
    ) -> Result<VerifyToken> {
        self.inner.table.register(short_name, callbacks, force)
    }

    pub fn register_unverified(
        &self,
        short_name: &str,
        callbacks: Callbacks,
        force: bool,
    ) -> Result<()> {
        self.inner
            .table
            .register_unverified(short_name, callbacks, force)
    }

    pub fn update(
        &self,
        short_name: &str,
        token: VerifyToken,
        callbacks: Callbacks,
    ) -> Result<Status> {
        self.inner.table.update(short_name, token, callbacks)
    }

    pub fn unregister(&self, short_name: &str, token: VerifyToken) -> Status {
        self.inner.table.unregister(short_name, token)
    }

    pub fn update_policy(
        &self,
        access_key: &AccessKey,
        short_name: &str,
        patch: &PolicyPatch,
    ) -> Result<Policy> {
        self.inner
            .table
            .update_policy(access_key, short_name, patch)
    }

    pub fn list_registrations(&self) -> Vec<RegistrationInfo> {
        self.inner.table.list_registrations()
    }

    /// Table-changed notifications (generation counter, no payload).
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.table.subscribe()
    }
}

impl Drop for UpdaterEngine {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.try_lock() {
            if let Some(running) = running.take() {
                running.shutdown.cancel();
            }
        }
    }
}

impl std::fmt::Debug for UpdaterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdaterEngine")
            .field("config", &self.inner.config)
            .field("table", &self.inner.table)
            .finish()
    }
}

impl EngineInner {
    async fn run_timer(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("poll timer shutting down");
                    break;
                }

                _ = interval.tick() => {
                    // Failures are logged inside the cycle; the timer keeps going.
                    let _ = self.run_cycle("timer").await;
                }
            }
        }
    }

    async fn run_persister(self: Arc<Self>, shutdown: CancellationToken) {
        let mut changes = self.table.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.persist_current().await;
                }
            }
        }
    }

    async fn run_cycle(&self, trigger: &str) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4().to_string();
        let span = cycle_span(&cycle_id, trigger);
        self.cycle(cycle_id, trigger).instrument(span).await
    }

    async fn cycle(&self, cycle_id: String, trigger: &str) -> Result<CycleReport> {
        let started = Instant::now();
        emit_cycle_started(&cycle_id, trigger);

        let _cycling = self.cycling.lock().await;
        let previous = self.previous.lock().await.clone();

        let current = match self.fetcher.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                emit_fetch_failed(&cycle_id, &e);
                emit_cycle_finished(&cycle_id, elapsed_ms(started), 0, false);
                return Err(e.into());
            }
        };

        let (baseline, changes) = match previous.as_ref() {
            Some(prev) => (false, diff_snapshots(prev, &current)),
            None => {
                info!(packages = current.len(), "catalog baseline established");
                (true, Vec::new())
            }
        };
        for change in &changes {
            emit_change_detected(change);
        }

        let outcomes = self.dispatcher.dispatch_all(&changes).await;
        let install = self.queue.flush().await;

        {
            let mut slot = self.previous.lock().await;
            *slot = Some(current);
            self.save(slot.as_ref()).await;
        }

        let duration_ms = elapsed_ms(started);
        METRICS.inc_cycles();
        METRICS.flush();
        emit_cycle_finished(&cycle_id, duration_ms, changes.len(), true);

        Ok(CycleReport {
            cycle_id,
            trigger: trigger.to_string(),
            baseline,
            changes,
            outcomes,
            install,
            duration_ms,
        })
    }

    async fn persist_current(&self) {
        let previous = self.previous.lock().await;
        self.save(previous.as_ref()).await;
    }

    /// Save `{snapshot, policies}`. Failures are logged; they never fail a
    /// cycle or a registration.
    async fn save(&self, snapshot: Option<&Snapshot>) {
        let Some(store) = &self.store else {
            return;
        };
        let _saving = self.saving.lock().await;

        let state = PersistedState {
            snapshot: snapshot.cloned(),
            policies: self.table.policies(),
        };
        let result = match state.to_document() {
            Ok(doc) => store.save(&doc).await.map_err(UpdaterError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist updater state");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{snapshot_of, RecordingInstaller, ScriptedFetcher};

    fn engine(fetcher: Arc<ScriptedFetcher>) -> UpdaterEngine {
        UpdaterEngine::new(
            UpdaterConfig::default(),
            fetcher,
            Arc::new(RecordingInstaller::new()),
            None,
        )
    }

    #[tokio::test]
    async fn first_cycle_is_baseline() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(snapshot_of(&[("a", "1")]));
        let engine = engine(fetcher);

        let report = engine.check_update().await.unwrap();
        assert!(report.baseline);
        assert!(report.changes.is_empty());
        assert_eq!(engine.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_previous_snapshot() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher
            .push(snapshot_of(&[("a", "1")]))
            .push_error(crate::domain::FetchError::Status { status: 502 })
            .push(snapshot_of(&[("a", "2")]));
        let engine = engine(fetcher);

        engine.check_update().await.unwrap();
        assert!(matches!(
            engine.check_update().await,
            Err(UpdaterError::Fetch(_))
        ));
        let report = engine.check_update().await.unwrap();
        assert_eq!(
            report.changes,
            vec![ChangeEvent::update("a", "koishi-plugin-a", "1", "2")]
        );
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_config() {
        let config = UpdaterConfig {
            poll_interval_ms: 0,
            ..UpdaterConfig::default()
        };
        assert!(matches!(
            UpdaterEngine::from_config(config),
            Err(UpdaterError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn install_unknown_registration_is_not_found() {
        let engine = engine(Arc::new(ScriptedFetcher::new()));
        let err = engine
            .install("ghost", VerifyToken::try_from(1u32).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::NotFound { .. }));
    }
}

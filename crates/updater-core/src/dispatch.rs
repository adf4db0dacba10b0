//! Permission-gated callback dispatch.
//!
//! For each change event: look up the registration, check its policy, run
//! the callback for the event kind, and queue an install when the callback
//! asked for one and the policy allows it. Callback failures are isolated to
//! the event that raised them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ChangeEvent, ChangeKind};
use crate::metrics::METRICS;
use crate::obs::emit_callback_failed;
use crate::queue::{InstallQueue, InstallTask};
use crate::registry::RegistrationTable;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Nobody registered for the short name.
    NoRegistration,
    /// Registered, but `allow_receive_message` is off.
    Muted,
    /// Registered without a callback for this kind.
    Unbound,
    /// Callback ran and did not request an install.
    Acknowledged,
    /// Callback requested an install and it was queued.
    InstallQueued,
    /// Callback requested an install the policy does not permit.
    InstallNotPermitted,
    /// Callback returned an error, panicked or timed out.
    CallbackFailed,
}

pub struct Dispatcher {
    table: Arc<RegistrationTable>,
    queue: Arc<InstallQueue>,
    enforce_policy: bool,
    callback_timeout: Option<Duration>,
}

impl Dispatcher {
    /// With `enforce_policy` off every bound callback receives its events and
    /// install requests are never queued.
    pub fn new(table: Arc<RegistrationTable>, queue: Arc<InstallQueue>, enforce_policy: bool) -> Self {
        Self {
            table,
            queue,
            enforce_policy,
            callback_timeout: None,
        }
    }

    /// Abandon callbacks still pending after `timeout`.
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Dispatch every event concurrently and wait for all of them.
    ///
    /// Outcomes are returned in the order of `events`.
    pub async fn dispatch_all(&self, events: &[ChangeEvent]) -> Vec<DispatchOutcome> {
        join_all(events.iter().map(|event| self.dispatch(event))).await
    }

    pub async fn dispatch(&self, event: &ChangeEvent) -> DispatchOutcome {
        let Some(target) = self.table.dispatch_target(&event.short_name) else {
            return DispatchOutcome::NoRegistration;
        };

        if self.enforce_policy && !target.policy.allow_receive_message {
            debug!(short_name = %event.short_name, "message delivery not permitted");
            return DispatchOutcome::Muted;
        }

        let Some(callback) = target.callbacks.invoke(event) else {
            return DispatchOutcome::Unbound;
        };
        METRICS.inc_events_dispatched();

        // A panicking callback surfaces as a JoinError instead of unwinding
        // through the cycle.
        let mut handle = tokio::spawn(callback);
        let joined = match self.callback_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut handle).await {
                Ok(joined) => joined,
                Err(elapsed) => {
                    handle.abort();
                    return self.callback_failed(event, &elapsed);
                }
            },
            None => handle.await,
        };
        let wants_install = match joined {
            Ok(Ok(wants_install)) => wants_install,
            Ok(Err(e)) => return self.callback_failed(event, &e),
            Err(join_error) => return self.callback_failed(event, &join_error),
        };

        if !wants_install || event.kind == ChangeKind::Delete {
            return DispatchOutcome::Acknowledged;
        }

        if !self.enforce_policy || !target.policy.allow_install {
            debug!(short_name = %event.short_name, "install request not permitted");
            return DispatchOutcome::InstallNotPermitted;
        }

        match event.install_version() {
            Some(version) => {
                self.queue
                    .enqueue(InstallTask::new(event.full_name.clone(), version));
                DispatchOutcome::InstallQueued
            }
            None => DispatchOutcome::Acknowledged,
        }
    }

    fn callback_failed(&self, event: &ChangeEvent, error: &dyn std::fmt::Display) -> DispatchOutcome {
        emit_callback_failed(&event.short_name, &event.kind.to_string(), error);
        METRICS.inc_callback_failures();
        DispatchOutcome::CallbackFailed
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("enforce_policy", &self.enforce_policy)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

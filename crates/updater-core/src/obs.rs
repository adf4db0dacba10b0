//! Structured observability hooks for the update cycle.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via [`cycle_span`]
//! - Emission functions for key lifecycle events: cycle start/finish, detected
//!   changes, failed callbacks, install flushes and registration changes
//!
//! Events are emitted at `info!` level unless noted. Filter with `RUST_LOG`.

use tracing::{info, warn};

use crate::domain::ChangeEvent;

/// Span tagging everything inside one poll cycle with its id.
///
/// Attach with [`tracing::Instrument::instrument`]; an entered span guard
/// cannot be held across the cycle's await points on a multi-threaded
/// runtime.
///
/// ```ignore
/// let id = uuid::Uuid::new_v4().to_string();
/// engine.run_cycle().instrument(cycle_span(&id, "timer")).await;
/// ```
pub fn cycle_span(cycle_id: &str, trigger: &str) -> tracing::Span {
    tracing::info_span!("updater.cycle", cycle_id = %cycle_id, trigger = %trigger)
}

/// Emit event: a poll cycle started.
pub fn emit_cycle_started(cycle_id: &str, trigger: &str) {
    info!(event = "cycle.started", cycle_id = %cycle_id, trigger = %trigger);
}

/// Emit event: a poll cycle finished.
pub fn emit_cycle_finished(cycle_id: &str, duration_ms: u64, changes: usize, success: bool) {
    info!(
        event = "cycle.finished",
        cycle_id = %cycle_id,
        duration_ms = duration_ms,
        changes = changes,
        success = success,
    );
}

/// Emit event: one change found by the diff.
pub fn emit_change_detected(change: &ChangeEvent) {
    info!(
        event = "change.detected",
        short_name = %change.short_name,
        full_name = %change.full_name,
        kind = %change.kind,
        from_version = change.from_version.as_deref().unwrap_or(""),
        to_version = change.to_version.as_deref().unwrap_or(""),
    );
}

/// Emit event: a subscriber callback errored or panicked (warning level).
pub fn emit_callback_failed(short_name: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "callback.failed", short_name = %short_name, kind = %kind, error = %error);
}

/// Emit event: the install queue was flushed to the installer.
pub fn emit_install_flushed(packages: usize, success: bool) {
    info!(event = "install.flushed", packages = packages, success = success);
}

/// Emit event: a registration was added, replaced, updated or removed.
pub fn emit_registration_changed(short_name: &str, action: &str) {
    info!(event = "registration.changed", short_name = %short_name, action = %action);
}

/// Emit event: a fetch failed and the cycle was abandoned (warning level).
pub fn emit_fetch_failed(cycle_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cycle.fetch_failed", cycle_id = %cycle_id, error = %error);
}

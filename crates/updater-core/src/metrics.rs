//! Global atomic counters for the updater.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the daemon does so on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cycles_completed: AtomicU64,
    events_dispatched: AtomicU64,
    installs_queued: AtomicU64,
    callback_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            installs_queued: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_cycles(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_completed", "counter incremented");
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_dispatched", "counter incremented");
    }

    pub fn inc_installs_queued(&self) {
        self.installs_queued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "installs_queued", "counter incremented");
    }

    pub fn inc_callback_failures(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "callback_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_completed = self.cycles_completed(),
            events_dispatched = self.events_dispatched(),
            installs_queued = self.installs_queued(),
            callback_failures = self.callback_failures(),
        );
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn installs_queued(&self) -> u64 {
        self.installs_queued.load(Ordering::Relaxed)
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }
}

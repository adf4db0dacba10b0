//! Snapshot diffing.
//!
//! Visits every short name in `keys(previous) ∪ keys(current)` exactly once
//! and emits at most one [`ChangeEvent`] per name. Version strings are
//! compared for equality only; no ordering between versions is assumed, so a
//! downgrade is reported as an update too.

use std::collections::BTreeSet;

use crate::domain::{ChangeEvent, Snapshot};

/// Diff two snapshots.
///
/// - absent → present: `New`
/// - present → present, versions differ: `Update`
/// - present → absent: `Delete` (carrying the last-known full name/version)
/// - equal versions: nothing
///
/// Events come out sorted by short name. Callers must not rely on that order
/// for meaning.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    let names: BTreeSet<&str> = previous.short_names().chain(current.short_names()).collect();

    names
        .into_iter()
        .filter_map(|name| match (previous.get(name), current.get(name)) {
            (Some(before), Some(after)) if before.version == after.version => None,
            (Some(before), Some(after)) => Some(ChangeEvent::update(
                name,
                &after.full_name,
                &before.version,
                &after.version,
            )),
            (None, Some(after)) => Some(ChangeEvent::new(name, &after.full_name, &after.version)),
            (Some(before), None) => Some(ChangeEvent::delete(
                name,
                &before.full_name,
                &before.version,
            )),
            (None, None) => None,
        })
        .collect()
}

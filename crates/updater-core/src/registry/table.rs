//! The registration table.
//!
//! One entry per short name. Every mutation is a single-entry replace under
//! the table mutex; callbacks are never run while it is held. Each mutation
//! bumps the table-changed generation so observers can refresh.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{ChangeKind, Result, UpdaterError};
use crate::obs::emit_registration_changed;

use super::callbacks::Callbacks;
use super::policy::{Policy, PolicyPatch};
use super::token::{AccessKey, VerifyToken};

/// Outcome of an ownership-checked mutation.
///
/// Ownership mismatch is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    InvalidToken,
}

impl Status {
    /// Numeric status code: `0` success, `255` token mismatch.
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::InvalidToken => 255,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// One subscriber's binding for a short name.
#[derive(Debug, Clone)]
pub struct Registration {
    pub short_name: String,
    pub callbacks: Callbacks,
    token: VerifyToken,
    pub registered_at: DateTime<Utc>,
    pub policy: Policy,
}

/// Token-free view of a registration for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub short_name: String,
    pub registered_at: DateTime<Utc>,
    pub policy: Policy,
    pub bound: Vec<ChangeKind>,
    /// `false` for weak-mode registrations that accept any token.
    pub verified: bool,
}

impl From<&Registration> for RegistrationInfo {
    fn from(reg: &Registration) -> Self {
        Self {
            short_name: reg.short_name.clone(),
            registered_at: reg.registered_at,
            policy: reg.policy,
            bound: reg.callbacks.bound_kinds(),
            verified: !reg.token.is_unverified(),
        }
    }
}

/// What the dispatcher needs to deliver one event.
#[derive(Debug, Clone)]
pub struct DispatchTarget {
    pub callbacks: Callbacks,
    pub policy: Policy,
}

#[derive(Debug, Default)]
struct TableState {
    entries: HashMap<String, Registration>,
    /// Policies restored from persistence for names not registered yet.
    retained: BTreeMap<String, Policy>,
}

/// Registration table keyed by short name.
pub struct RegistrationTable {
    state: Mutex<TableState>,
    access_key: AccessKey,
    changed: watch::Sender<u64>,
}

impl RegistrationTable {
    /// Create an empty table whose policies are guarded by `access_key`.
    pub fn new(access_key: AccessKey) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(TableState::default()),
            access_key,
            changed,
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_changed(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }

    /// Subscribe to table-changed notifications.
    ///
    /// The value is a generation counter; only its change matters.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Register callbacks for `short_name` and return the ownership token.
    ///
    /// Fails with `AlreadyRegistered` when an existing registration has all
    /// three callbacks bound and `force` is false. Replacing a registration
    /// keeps its policy and registration time; the token is always fresh.
    pub fn register(
        &self,
        short_name: &str,
        callbacks: Callbacks,
        force: bool,
    ) -> Result<VerifyToken> {
        let token = VerifyToken::generate();
        self.insert(short_name, callbacks, force, token)?;
        Ok(token)
    }

    /// Register in back-compat weak mode: the stored token is `0`, so any
    /// presented token may later update or unregister it.
    pub fn register_unverified(
        &self,
        short_name: &str,
        callbacks: Callbacks,
        force: bool,
    ) -> Result<()> {
        self.insert(short_name, callbacks, force, VerifyToken::UNVERIFIED)
    }

    fn insert(
        &self,
        short_name: &str,
        callbacks: Callbacks,
        force: bool,
        token: VerifyToken,
    ) -> Result<()> {
        {
            let mut guard = self.state();
            let state = &mut *guard;

            let (policy, registered_at) = match state.entries.get(short_name) {
                Some(existing) if existing.callbacks.is_complete() && !force => {
                    return Err(UpdaterError::AlreadyRegistered {
                        short_name: short_name.to_string(),
                    });
                }
                Some(existing) => (existing.policy, existing.registered_at),
                None => (
                    state.retained.remove(short_name).unwrap_or_default(),
                    Utc::now(),
                ),
            };

            state.entries.insert(
                short_name.to_string(),
                Registration {
                    short_name: short_name.to_string(),
                    callbacks,
                    token,
                    registered_at,
                    policy,
                },
            );
        }

        emit_registration_changed(short_name, "registered");
        self.notify_changed();
        Ok(())
    }

    /// Merge `callbacks` over an existing registration.
    ///
    /// `NotFound` when `short_name` is not registered; `InvalidToken` status
    /// when `token` does not unlock it.
    pub fn update(
        &self,
        short_name: &str,
        token: VerifyToken,
        callbacks: Callbacks,
    ) -> Result<Status> {
        {
            let mut state = self.state();
            let Some(entry) = state.entries.get_mut(short_name) else {
                return Err(UpdaterError::NotFound {
                    short_name: short_name.to_string(),
                });
            };

            if !entry.token.admits(token) {
                return Ok(Status::InvalidToken);
            }

            entry.callbacks.merge(callbacks);
        }

        emit_registration_changed(short_name, "updated");
        self.notify_changed();
        Ok(Status::Ok)
    }

    /// Remove a registration. Absent names succeed without a notification.
    pub fn unregister(&self, short_name: &str, token: VerifyToken) -> Status {
        {
            let mut state = self.state();
            let Some(entry) = state.entries.get(short_name) else {
                return Status::Ok;
            };

            if !entry.token.admits(token) {
                return Status::InvalidToken;
            }

            state.entries.remove(short_name);
        }

        emit_registration_changed(short_name, "unregistered");
        self.notify_changed();
        Status::Ok
    }

    /// Change the permission policy of a registration.
    ///
    /// Requires the process access key, not the registration token.
    pub fn update_policy(
        &self,
        access_key: &AccessKey,
        short_name: &str,
        patch: &PolicyPatch,
    ) -> Result<Policy> {
        if *access_key != self.access_key {
            return Err(UpdaterError::AccessDenied {
                short_name: short_name.to_string(),
            });
        }

        let policy = {
            let mut state = self.state();
            let Some(entry) = state.entries.get_mut(short_name) else {
                return Err(UpdaterError::NotFound {
                    short_name: short_name.to_string(),
                });
            };
            entry.policy.apply(patch);
            entry.policy
        };

        emit_registration_changed(short_name, "policy_updated");
        self.notify_changed();
        Ok(policy)
    }

    /// Token-free listing, sorted by short name.
    pub fn list_registrations(&self) -> Vec<RegistrationInfo> {
        let state = self.state();
        let mut rows: Vec<RegistrationInfo> =
            state.entries.values().map(RegistrationInfo::from).collect();
        rows.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        rows
    }

    /// Callbacks and policy for `short_name`, cloned out of the lock.
    pub fn dispatch_target(&self, short_name: &str) -> Option<DispatchTarget> {
        self.state().entries.get(short_name).map(|reg| DispatchTarget {
            callbacks: reg.callbacks.clone(),
            policy: reg.policy,
        })
    }

    pub fn policy(&self, short_name: &str) -> Option<Policy> {
        self.state().entries.get(short_name).map(|reg| reg.policy)
    }

    /// Verify `token` against a registration without mutating it.
    pub fn check_token(&self, short_name: &str, token: VerifyToken) -> Result<Status> {
        let state = self.state();
        let entry = state
            .entries
            .get(short_name)
            .ok_or_else(|| UpdaterError::NotFound {
                short_name: short_name.to_string(),
            })?;
        Ok(if entry.token.admits(token) {
            Status::Ok
        } else {
            Status::InvalidToken
        })
    }

    /// Policies worth persisting: live registrations plus restored policies
    /// whose owner has not registered again yet.
    pub fn policies(&self) -> BTreeMap<String, Policy> {
        let state = self.state();
        let mut policies = state.retained.clone();
        for (name, reg) in &state.entries {
            policies.insert(name.clone(), reg.policy);
        }
        policies
    }

    /// Re-apply persisted policies. Live registrations take them directly;
    /// the rest are held until their short name registers.
    pub fn restore_policies(&self, policies: BTreeMap<String, Policy>) {
        let mut guard = self.state();
        let state = &mut *guard;
        for (name, policy) in policies {
            match state.entries.get_mut(&name) {
                Some(reg) => reg.policy = policy,
                None => {
                    state.retained.insert(name, policy);
                }
            }
        }
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.state().entries.contains_key(short_name)
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RegistrationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationTable")
            .field("registrations", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Callbacks {
        Callbacks::new()
            .on_new(|_, _| async { Ok(false) })
            .on_update(|_, _, _| async { Ok(false) })
            .on_delete(|_| async { Ok(false) })
    }

    fn table() -> (RegistrationTable, AccessKey) {
        let key = AccessKey::generate();
        (RegistrationTable::new(key.clone()), key)
    }

    #[test]
    fn register_then_unregister_with_token() {
        let (table, _) = table();
        let token = table.register("market", complete(), false).unwrap();

        assert_eq!(table.unregister("market", token), Status::Ok);
        assert!(!table.contains("market"));
    }

    #[test]
    fn unregister_wrong_token_leaves_entry() {
        let (table, _) = table();
        let token = table.register("market", complete(), false).unwrap();
        let wrong = VerifyToken::try_from(token.value() ^ 1).unwrap();

        let status = table.unregister("market", wrong);
        assert_eq!(status, Status::InvalidToken);
        assert_eq!(status.code(), 255);
        assert!(table.contains("market"));
    }

    #[test]
    fn unregister_absent_is_ok() {
        let (table, _) = table();
        assert_eq!(table.unregister("nobody", VerifyToken::try_from(1u32).unwrap()), Status::Ok);
    }

    #[test]
    fn complete_registration_conflicts_without_force() {
        let (table, _) = table();
        table.register("market", complete(), false).unwrap();

        let err = table.register("market", complete(), false).unwrap_err();
        assert!(matches!(err, UpdaterError::AlreadyRegistered { .. }));
    }

    #[test]
    fn partial_registration_is_overwritten_without_force() {
        let (table, _) = table();
        table
            .register("market", Callbacks::new().on_new(|_, _| async { Ok(false) }), false)
            .unwrap();

        table.register("market", complete(), false).unwrap();
        assert_eq!(table.list_registrations()[0].bound.len(), 3);
    }

    #[test]
    fn force_preserves_policy_and_timestamp() {
        let (table, key) = table();
        table.register("market", complete(), false).unwrap();
        table
            .update_policy(&key, "market", &PolicyPatch::default().allow_install(true))
            .unwrap();
        let before = table.list_registrations()[0].clone();

        let token = table
            .register("market", Callbacks::new().on_delete(|_| async { Ok(true) }), true)
            .unwrap();

        let after = table.list_registrations()[0].clone();
        assert!(after.policy.allow_install);
        assert_eq!(after.registered_at, before.registered_at);
        assert_eq!(after.bound, vec![ChangeKind::Delete]);
        assert_eq!(table.unregister("market", token), Status::Ok);
    }

    #[test]
    fn update_requires_registration() {
        let (table, _) = table();
        let err = table
            .update("ghost", VerifyToken::try_from(1u32).unwrap(), Callbacks::new())
            .unwrap_err();
        assert!(matches!(err, UpdaterError::NotFound { .. }));
    }

    #[test]
    fn update_merges_and_keeps_token() {
        let (table, _) = table();
        let token = table
            .register("market", Callbacks::new().on_new(|_, _| async { Ok(false) }), false)
            .unwrap();

        let status = table
            .update("market", token, Callbacks::new().on_update(|_, _, _| async { Ok(true) }))
            .unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(
            table.list_registrations()[0].bound,
            vec![ChangeKind::New, ChangeKind::Update]
        );
        assert_eq!(table.check_token("market", token).unwrap(), Status::Ok);
    }

    #[test]
    fn update_with_wrong_token_is_invalid_status() {
        let (table, _) = table();
        let token = table.register("market", complete(), false).unwrap();
        let wrong = VerifyToken::try_from(token.value() ^ 1).unwrap();

        let status = table.update("market", wrong, Callbacks::new()).unwrap();
        assert_eq!(status, Status::InvalidToken);
    }

    #[test]
    fn unverified_registration_accepts_any_token() {
        let (table, _) = table();
        table.register_unverified("legacy", complete(), false).unwrap();

        assert!(!table.list_registrations()[0].verified);
        assert_eq!(
            table
                .update("legacy", VerifyToken::try_from(777u32).unwrap(), Callbacks::new())
                .unwrap(),
            Status::Ok
        );
        assert_eq!(table.unregister("legacy", VerifyToken::try_from(31337u32).unwrap()), Status::Ok);
        assert!(!table.contains("legacy"));
    }

    #[test]
    fn update_policy_requires_access_key() {
        let (table, _) = table();
        table.register("market", complete(), false).unwrap();

        let err = table
            .update_policy(
                &AccessKey::generate(),
                "market",
                &PolicyPatch::default().allow_install(true),
            )
            .unwrap_err();
        assert!(matches!(err, UpdaterError::AccessDenied { .. }));
        assert!(!table.policy("market").unwrap().allow_install);
    }

    #[test]
    fn update_policy_on_absent_name_is_not_found() {
        let (table, key) = table();
        let err = table
            .update_policy(&key, "ghost", &PolicyPatch::default())
            .unwrap_err();
        assert!(matches!(err, UpdaterError::NotFound { .. }));
    }

    #[test]
    fn mutations_bump_change_generation() {
        let (table, key) = table();
        let rx = table.subscribe();
        let start = *rx.borrow();

        let token = table.register("market", complete(), false).unwrap();
        table
            .update_policy(&key, "market", &PolicyPatch::default().allow_install(true))
            .unwrap();
        table.update("market", token, Callbacks::new()).unwrap();
        table.unregister("market", token);

        assert_eq!(*rx.borrow(), start + 4);
    }

    #[test]
    fn failed_mutations_do_not_notify() {
        let (table, _) = table();
        let token = table.register("market", complete(), false).unwrap();
        let rx = table.subscribe();
        let start = *rx.borrow();

        let _ = table.register("market", complete(), false);
        table.unregister("market", VerifyToken::try_from(token.value() ^ 1).unwrap());
        table.unregister("absent", token);

        assert_eq!(*rx.borrow(), start);
    }

    #[test]
    fn restored_policy_applies_on_register() {
        let (table, _) = table();
        let mut restored = BTreeMap::new();
        restored.insert(
            "market".to_string(),
            Policy {
                allow_install: true,
                allow_receive_message: true,
            },
        );
        table.restore_policies(restored);

        table.register("market", complete(), false).unwrap();
        assert!(table.policy("market").unwrap().allow_install);
        assert_eq!(table.policies().len(), 1);
    }

    #[test]
    fn listing_has_no_token_field() {
        let (table, _) = table();
        let token = table.register("market", complete(), false).unwrap();

        let rows = table.list_registrations();
        let json = serde_json::to_value(&rows).unwrap();
        let keys: Vec<&String> = json[0].as_object().unwrap().keys().collect();
        assert!(keys.iter().all(|k| !k.contains("token")));
        assert_eq!(table.unregister("market", token), Status::Ok);
    }
}

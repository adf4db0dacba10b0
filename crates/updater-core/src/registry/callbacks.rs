//! Callback bindings, one optional async function per change kind.
//!
//! A callback resolving to `Ok(true)` asks the updater to install the
//! package version the event points at. `Ok(false)` is a plain
//! acknowledgement; `Err` is logged and isolated.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::domain::{ChangeEvent, ChangeKind};

/// What a callback resolves to: `Ok(true)` requests an install.
pub type CallbackResult = anyhow::Result<bool>;

/// Boxed callback future.
pub type CallbackFuture = BoxFuture<'static, CallbackResult>;

/// `(short_name, version)`
pub type OnNew = Arc<dyn Fn(String, String) -> CallbackFuture + Send + Sync>;

/// `(short_name, from_version, to_version)`
pub type OnUpdate = Arc<dyn Fn(String, String, String) -> CallbackFuture + Send + Sync>;

/// `(short_name)`
pub type OnDelete = Arc<dyn Fn(String) -> CallbackFuture + Send + Sync>;

/// The set of callbacks a subscriber binds for one short name.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_new: Option<OnNew>,
    pub on_update: Option<OnUpdate>,
    pub on_delete: Option<OnDelete>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let callback: OnNew =
            Arc::new(move |name: String, version: String| -> CallbackFuture {
                Box::pin(f(name, version))
            });
        self.on_new = Some(callback);
        self
    }

    pub fn on_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let callback: OnUpdate =
            Arc::new(move |name: String, from: String, to: String| -> CallbackFuture {
                Box::pin(f(name, from, to))
            });
        self.on_update = Some(callback);
        self
    }

    pub fn on_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let callback: OnDelete =
            Arc::new(move |name: String| -> CallbackFuture { Box::pin(f(name)) });
        self.on_delete = Some(callback);
        self
    }

    /// All three kinds are bound.
    pub fn is_complete(&self) -> bool {
        self.on_new.is_some() && self.on_update.is_some() && self.on_delete.is_some()
    }

    pub fn is_bound(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::New => self.on_new.is_some(),
            ChangeKind::Update => self.on_update.is_some(),
            ChangeKind::Delete => self.on_delete.is_some(),
        }
    }

    pub fn bound_kinds(&self) -> Vec<ChangeKind> {
        [ChangeKind::New, ChangeKind::Update, ChangeKind::Delete]
            .into_iter()
            .filter(|kind| self.is_bound(*kind))
            .collect()
    }

    /// Shallow merge: every callback bound in `other` replaces ours, the
    /// rest stay as they were.
    pub fn merge(&mut self, other: Callbacks) {
        if let Some(on_new) = other.on_new {
            self.on_new = Some(on_new);
        }
        if let Some(on_update) = other.on_update {
            self.on_update = Some(on_update);
        }
        if let Some(on_delete) = other.on_delete {
            self.on_delete = Some(on_delete);
        }
    }

    /// Start the callback matching `event.kind`, `None` when unbound.
    ///
    /// Delete callbacks receive no version arguments.
    pub fn invoke(&self, event: &ChangeEvent) -> Option<CallbackFuture> {
        let name = event.short_name.clone();
        match event.kind {
            ChangeKind::New => self.on_new.as_ref().map(|f| {
                f(name, event.to_version.clone().unwrap_or_default())
            }),
            ChangeKind::Update => self.on_update.as_ref().map(|f| {
                f(
                    name,
                    event.from_version.clone().unwrap_or_default(),
                    event.to_version.clone().unwrap_or_default(),
                )
            }),
            ChangeKind::Delete => self.on_delete.as_ref().map(|f| f(name)),
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("bound", &self.bound_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_binds_requested_kinds() {
        let callbacks = Callbacks::new()
            .on_new(|_, _| async { Ok(false) })
            .on_delete(|_| async { Ok(false) });

        assert_eq!(
            callbacks.bound_kinds(),
            vec![ChangeKind::New, ChangeKind::Delete]
        );
        assert!(!callbacks.is_complete());
    }

    #[test]
    fn merge_keeps_unsupplied_bindings() {
        let mut callbacks = Callbacks::new()
            .on_new(|_, _| async { Ok(false) })
            .on_update(|_, _, _| async { Ok(false) });
        callbacks.merge(Callbacks::new().on_delete(|_| async { Ok(true) }));

        assert!(callbacks.is_complete());
    }

    #[tokio::test]
    async fn invoke_routes_by_kind_with_arguments() {
        let callbacks = Callbacks::new().on_update(|name, from, to| async move {
            Ok(name == "a" && from == "1" && to == "2")
        });

        let fut = callbacks
            .invoke(&ChangeEvent::update("a", "koishi-plugin-a", "1", "2"))
            .expect("update bound");
        assert!(fut.await.unwrap());

        assert!(callbacks
            .invoke(&ChangeEvent::new("a", "koishi-plugin-a", "1"))
            .is_none());
    }
}

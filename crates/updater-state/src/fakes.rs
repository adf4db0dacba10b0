//! In-memory fake for the state store (testing only)
//!
//! `MemoryStateStore` satisfies the `StateStore` contract without touching
//! the filesystem and counts saves so tests can assert on persistence
//! triggers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage_traits::{StateResult, StateStore};

/// In-memory state store holding at most one document.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    doc: Mutex<Option<serde_json::Value>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if a previous process had saved `doc`.
    pub fn with_document(doc: serde_json::Value) -> Self {
        Self {
            doc: Mutex::new(Some(doc)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current document, if any.
    pub fn document(&self) -> Option<serde_json::Value> {
        self.doc.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, doc: &serde_json::Value) -> StateResult<()> {
        *self.doc.lock().unwrap() = Some(doc.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> StateResult<Option<serde_json::Value>> {
        Ok(self.doc.lock().unwrap().clone())
    }
}

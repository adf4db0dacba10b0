//! Storage trait definition for updater state
//!
//! The updater keeps a single JSON document (last observed catalog snapshot
//! plus granted permission policies) so that a restart does not forget what
//! it has already seen. The document shape belongs to the engine; this layer
//! only moves opaque JSON in and out.

use async_trait::async_trait;

use crate::error::StateError;

/// Result type for storage operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Persistent home of the updater state document.
///
/// Guarantees:
/// - `load()` after `save(doc)` returns `doc`.
/// - `load()` before any save returns `None`.
/// - A failed `save` leaves the previously saved document readable.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the stored document.
    async fn save(&self, doc: &serde_json::Value) -> StateResult<()>;

    /// Load the stored document, `None` when nothing was saved yet.
    async fn load(&self) -> StateResult<Option<serde_json::Value>>;
}

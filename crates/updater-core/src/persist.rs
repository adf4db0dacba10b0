//! The document the engine hands to its state store.
//!
//! `{ "snapshot": {...} | null, "policies": { short_name: Policy } }`.
//! Tokens and callbacks are process-local and never written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Result, Snapshot};
use crate::registry::Policy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Last observed catalog. `None` until the first successful fetch.
    #[serde(default)]
    pub snapshot: Option<Snapshot>,
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
}

impl PersistedState {
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: Value) -> Result<Self> {
        Ok(serde_json::from_value(doc)?)
    }
}

//! Change events produced by diffing two snapshots.

use serde::{Deserialize, Serialize};

/// What happened to a package between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::New => write!(f, "new"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One package's appearance, version change, or disappearance.
///
/// | kind   | from_version      | to_version |
/// |--------|-------------------|------------|
/// | New    | None              | Some       |
/// | Update | Some              | Some       |
/// | Delete | Some (last known) | None       |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub short_name: String,
    /// From the current snapshot when present, else the last-known name.
    pub full_name: String,
    pub kind: ChangeKind,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
}

impl ChangeEvent {
    pub fn new(short_name: &str, full_name: &str, version: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: full_name.to_string(),
            kind: ChangeKind::New,
            from_version: None,
            to_version: Some(version.to_string()),
        }
    }

    pub fn update(short_name: &str, full_name: &str, from: &str, to: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: full_name.to_string(),
            kind: ChangeKind::Update,
            from_version: Some(from.to_string()),
            to_version: Some(to.to_string()),
        }
    }

    pub fn delete(short_name: &str, full_name: &str, last_version: &str) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: full_name.to_string(),
            kind: ChangeKind::Delete,
            from_version: Some(last_version.to_string()),
            to_version: None,
        }
    }

    /// Version an install triggered by this event would target:
    /// `to_version`, falling back to `from_version`.
    pub fn install_version(&self) -> Option<&str> {
        self.to_version
            .as_deref()
            .or(self.from_version.as_deref())
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.from_version, &self.to_version) {
            (ChangeKind::Update, Some(from), Some(to)) => {
                write!(f, "update {} ({from} → {to})", self.short_name)
            }
            (ChangeKind::New, _, Some(to)) => write!(f, "new {} ({to})", self.short_name),
            _ => write!(f, "{} {}", self.kind, self.short_name),
        }
    }
}

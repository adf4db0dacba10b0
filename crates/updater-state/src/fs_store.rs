use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::storage_traits::{StateResult, StateStore};

/// Directory under the data dir that holds the state document.
pub const STATE_DIR: &str = "updater";

/// File name of the state document.
pub const STATE_FILE: &str = "state.json";

/// Filesystem-backed state store writing one JSON document.
///
/// Layout: `<data_dir>/updater/state.json`. Writes go to a temp file in the
/// same directory and are renamed over the target, so readers never see a
/// half-written document.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    path: PathBuf,
}

impl FsStateStore {
    /// Create a store rooted at `data_dir`. Nothing is touched on disk until
    /// the first save.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STATE_DIR).join(STATE_FILE),
        }
    }

    /// Full path of the state document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Make sure the parent directory exists and is a directory.
///
/// A regular file squatting on the directory path is removed.
fn ensure_dir(dir: &Path) -> StateResult<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            warn!(path = %dir.display(), "state directory path is a file, replacing it");
            fs::remove_file(dir).map_err(|e| StateError::io(dir, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StateError::io(dir, e)),
    }
    fs::create_dir_all(dir).map_err(|e| StateError::io(dir, e))
}

fn write_atomic(path: &Path, dir: &Path, bytes: &[u8]) -> StateResult<()> {
    ensure_dir(dir)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| StateError::io(tmp.path().to_path_buf(), e))?;
    tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

fn read_document(path: &Path) -> StateResult<Option<serde_json::Value>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StateError::Deserialization(format!("{}: {e}", path.display())))
}

#[async_trait]
impl StateStore for FsStateStore {
    async fn save(&self, doc: &serde_json::Value) -> StateResult<()> {
        let bytes =
            serde_json::to_vec_pretty(doc).map_err(|e| StateError::Serialization(e.to_string()))?;
        let path = self.path.clone();
        let dir = self.parent().to_path_buf();

        tokio::task::spawn_blocking(move || write_atomic(&path, &dir, &bytes)).await??;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    async fn load(&self) -> StateResult<Option<serde_json::Value>> {
        let path = self.path.clone();
        let doc = tokio::task::spawn_blocking(move || read_document(&path)).await??;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_creates_directory_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path().join("nested"));
        let doc = json!({"snapshot": {"a": "1.0.0"}});

        store.save(&doc).await.unwrap();

        assert!(store.path().exists());
        assert_eq!(store.load().await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn save_replaces_file_occupying_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_DIR), b"not a directory").unwrap();
        let store = FsStateStore::new(dir.path());

        store.save(&json!({"ok": true})).await.unwrap();

        assert!(dir.path().join(STATE_DIR).is_dir());
        assert_eq!(store.load().await.unwrap(), Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn corrupt_document_is_a_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(store.path(), b"{ truncated").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StateError::Deserialization(_)));
    }
}

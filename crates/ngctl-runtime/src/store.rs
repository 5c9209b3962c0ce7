use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ngctl_core::state::ClusterState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read state {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of the node group's state snapshot.
pub trait StateStore: Send + Sync {
    /// Write `state` as the latest snapshot.
    fn persist(&self, state: &ClusterState) -> Result<(), StoreError>;

    /// Read the latest snapshot, if one was ever written.
    fn load(&self) -> Result<Option<ClusterState>, StoreError>;
}

/// Snapshot stored as pretty JSON at a fixed path.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so a crash never leaves a torn snapshot behind.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn persist(&self, state: &ClusterState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| self.write_err(e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.write_err(e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<ClusterState>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// In-memory store that keeps every snapshot ever persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    history: Arc<Mutex<Vec<ClusterState>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if a previous run had written it.
    pub fn with_state(state: ClusterState) -> Self {
        let store = Self::default();
        store.lock_history().push(state);
        store
    }

    /// Make subsequent `persist` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn history(&self) -> Vec<ClusterState> {
        self.lock_history().clone()
    }

    pub fn latest(&self) -> Option<ClusterState> {
        self.lock_history().last().cloned()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<ClusterState>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn persist(&self, state: &ClusterState) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        self.lock_history().push(state.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ClusterState>, StoreError> {
        Ok(self.latest())
    }
}

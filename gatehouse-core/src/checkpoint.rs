//! Collector output checkpoints keyed by research context.
//!
//! A bundle caches one initial collection pass. The key is a hash of the
//! serialized context and the sorted collector names, so a changed input or
//! collector set never reuses stale output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collector::{CollectorOutput, ResearchContext};
use crate::error::CheckpointError;
use crate::persistence;

/// A cached collection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointBundle {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub outputs: Vec<CollectorOutput>,
}

impl CheckpointBundle {
    pub fn new(key: impl Into<String>, outputs: Vec<CollectorOutput>) -> Self {
        Self {
            key: key.into(),
            created_at: Utc::now(),
            outputs,
        }
    }

    /// Whether the bundle is younger than `ttl_secs` at `now`.
    pub fn is_fresh(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.signed_duration_since(self.created_at).num_seconds() < ttl
    }

    pub fn successful(&self) -> usize {
        self.outputs.iter().filter(|o| o.success).count()
    }
}

/// SHA-256 of the serialized context plus the sorted collector names.
pub fn checkpoint_key(context: &ResearchContext, collectors: &[&str]) -> String {
    let mut names: Vec<&str> = collectors.to_vec();
    names.sort_unstable();
    let serialized = serde_json::to_string(context).unwrap_or_else(|_| format!("{context:?}"));

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    for name in names {
        hasher.update([0x1f]);
        hasher.update(name.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Key-value store for checkpoint bundles.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CheckpointBundle>, CheckpointError>;
    fn save(&self, bundle: &CheckpointBundle) -> Result<(), CheckpointError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, key: &str) -> Result<Option<CheckpointBundle>, CheckpointError> {
        let path = self.path_for(key);
        persistence::read_json(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                CheckpointError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            } else {
                CheckpointError::Unavailable {
                    message: format!("{}: {e}", path.display()),
                }
            }
        })
    }

    fn save(&self, bundle: &CheckpointBundle) -> Result<(), CheckpointError> {
        let path = self.path_for(&bundle.key);
        persistence::write_json_atomic(&path, bundle).map_err(|e| CheckpointError::Unavailable {
            message: format!("{}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), outputs = bundle.outputs.len(), "Checkpoint saved");
        Ok(())
    }
}

/// Process-local store, mainly for tests.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: Mutex<HashMap<String, CheckpointBundle>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, key: &str) -> Result<Option<CheckpointBundle>, CheckpointError> {
        let entries = self.entries.lock().map_err(|e| CheckpointError::Unavailable {
            message: e.to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, bundle: &CheckpointBundle) -> Result<(), CheckpointError> {
        let mut entries = self.entries.lock().map_err(|e| CheckpointError::Unavailable {
            message: e.to_string(),
        })?;
        entries.insert(bundle.key.clone(), bundle.clone());
        Ok(())
    }
}

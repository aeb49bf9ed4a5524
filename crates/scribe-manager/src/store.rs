//! Registry-store implementations.
//!
//! The contract lives in `scribe-core`; two implementations are provided
//! here: an in-memory store for tests and ephemeral hosts, and a JSON-file
//! store that persists the full record set as one document written atomically
//! via write-then-rename.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use scribe_core::{LifecycleState, PluginError, PluginResult, RegistryRecord, RegistryStore};

// ─── MemoryRegistryStore ─────────────────────────────────────────────────────

/// Volatile registry store.
#[derive(Default)]
pub struct MemoryRegistryStore {
    records: RwLock<HashMap<String, RegistryRecord>>,
}

impl MemoryRegistryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn put(&self, record: RegistryRecord) -> PluginResult<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> PluginResult<Option<RegistryRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> PluginResult<()> {
        self.records.write().remove(id);
        Ok(())
    }

    async fn list_active(&self) -> PluginResult<Vec<RegistryRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.last_known_state == LifecycleState::Active)
            .cloned()
            .collect())
    }
}

// ─── FileRegistryStore ───────────────────────────────────────────────────────

/// Registry store persisting all records as one JSON document.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so readers never observe a torn document.
pub struct FileRegistryStore {
    path: PathBuf,
    records: RwLock<HashMap<String, RegistryRecord>>,
}

impl FileRegistryStore {
    /// Opens (or creates) the store backed by `path`.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let records = if path.is_file() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| PluginError::store(&path, e.to_string()))?;
            serde_json::from_str(&raw).map_err(|e| PluginError::store(&path, e.to_string()))?
        } else {
            HashMap::new()
        };
        info!(path = %path.display(), "Opened plugin registry store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    fn persist(&self) -> PluginResult<()> {
        let serialized = {
            let records = self.records.read();
            serde_json::to_string_pretty(&*records)
                .map_err(|e| PluginError::store(&self.path, e.to_string()))?
        };

        let dir = self.path.parent().unwrap_or(std::path::Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| PluginError::store(dir, e.to_string()))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PluginError::store(dir, e.to_string()))?;
        temp.write_all(serialized.as_bytes())
            .map_err(|e| PluginError::store(&self.path, e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| PluginError::store(&self.path, e.to_string()))?;
        debug!(path = %self.path.display(), "Persisted plugin registry");
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn put(&self, record: RegistryRecord) -> PluginResult<()> {
        self.records.write().insert(record.id.clone(), record);
        self.persist()
    }

    async fn get(&self, id: &str) -> PluginResult<Option<RegistryRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> PluginResult<()> {
        let removed = self.records.write().remove(id).is_some();
        if removed {
            self.persist()?;
        }
        Ok(())
    }

    async fn list_active(&self) -> PluginResult<Vec<RegistryRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.last_known_state == LifecycleState::Active)
            .cloned()
            .collect())
    }
}

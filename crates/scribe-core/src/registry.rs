//! Registry-store contract: the persistent catalog of installed plugins.
//!
//! The store itself is an external collaborator; the runtime only consumes
//! this interface. Implementations live in `scribe-manager`.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::descriptor::PluginDescriptor;
use crate::entry::PluginConfig;
use crate::error::PluginResult;
use crate::state::LifecycleState;

/// One persisted record per installed plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Plugin id (equals the descriptor name).
    pub id: String,
    /// The immutable descriptor captured at install time.
    pub descriptor: PluginDescriptor,
    /// Filesystem path of the bundle the plugin was loaded from.
    pub bundle_path: PathBuf,
    /// Persisted configuration.
    pub config: PluginConfig,
    /// Last state the manager observed for this plugin.
    pub last_known_state: LifecycleState,
    /// When the record was first written.
    pub created_at: SystemTime,
    /// When the record was last written.
    pub updated_at: SystemTime,
}

impl RegistryRecord {
    /// Creates a fresh record in the given state.
    pub fn new(
        descriptor: PluginDescriptor,
        bundle_path: PathBuf,
        config: PluginConfig,
        state: LifecycleState,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: descriptor.name.clone(),
            descriptor,
            bundle_path,
            config,
            last_known_state: state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyed document store holding [`RegistryRecord`]s.
///
/// The manager performs read-modify-write on a record only while holding that
/// plugin's lifecycle mutex, so implementations need no per-record locking.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Inserts or replaces the record for `record.id`.
    async fn put(&self, record: RegistryRecord) -> PluginResult<()>;

    /// Fetches the record for `id`, if present.
    async fn get(&self, id: &str) -> PluginResult<Option<RegistryRecord>>;

    /// Removes the record for `id`. Removing an absent id is not an error.
    async fn delete(&self, id: &str) -> PluginResult<()>;

    /// Returns every record whose last-known state is Active.
    async fn list_active(&self) -> PluginResult<Vec<RegistryRecord>>;
}

//! Live plugin instances.

use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};

use scribe_bus::SubscriptionId;
use scribe_core::{PluginConfig, PluginDescriptor, SharedEntry};

/// A loaded plugin: descriptor, live entry handle, configuration, and the
/// runtime bookkeeping the manager needs.
///
/// The descriptor is read-only for the lifetime of the instance; config,
/// token, and subscriptions change under the per-plugin lifecycle mutex held
/// by the manager.
pub struct PluginInstance {
    /// Immutable descriptor captured at install time.
    pub descriptor: PluginDescriptor,
    /// Handle to the plugin's entry object.
    pub entry: SharedEntry,
    /// Bundle the plugin was loaded from.
    pub bundle_path: PathBuf,
    config: RwLock<PluginConfig>,
    token: RwLock<String>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl PluginInstance {
    /// Creates an instance with no token and no subscriptions yet.
    pub fn new(
        descriptor: PluginDescriptor,
        entry: SharedEntry,
        bundle_path: PathBuf,
        config: PluginConfig,
    ) -> Self {
        Self {
            descriptor,
            entry,
            bundle_path,
            config: RwLock::new(config),
            token: RwLock::new(String::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The plugin id (descriptor name).
    pub fn id(&self) -> &str {
        &self.descriptor.name
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> PluginConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration.
    pub fn set_config(&self, config: PluginConfig) {
        *self.config.write() = config;
    }

    /// The current security token (empty until minted).
    pub fn token(&self) -> String {
        self.token.read().clone()
    }

    /// Records a freshly minted token.
    pub fn set_token(&self, token: String) {
        *self.token.write() = token;
    }

    /// Records an active subscription handle.
    pub fn add_subscription(&self, id: SubscriptionId) {
        self.subscriptions.lock().push(id);
    }

    /// Clears and returns the recorded subscription handles.
    pub fn take_subscriptions(&self) -> Vec<SubscriptionId> {
        std::mem::take(&mut *self.subscriptions.lock())
    }

    /// Number of recorded subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

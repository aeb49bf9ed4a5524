//! Plugin lifecycle management.
//!
//! [`PluginManager`] is the central owner of all installed plugins. It:
//!
//! - Drives the install protocol end to end: load (local or remote), name
//!   collision and descriptor checks, registry persistence, initialize +
//!   start, event subscription, permission grant, token mint, and the
//!   `system.plugin.installed` announcement.
//! - Serializes lifecycle operations per plugin id on a dedicated async
//!   mutex; operations on different plugins proceed in parallel.
//! - Bounds install/start with one deadline and stop with another; a missed
//!   deadline moves the instance to the error state, never to a partial one.
//! - Restores previously active plugins at host startup and stops everything
//!   at shutdown, tolerating individual failures throughout.
//!
//! The manager never panics on plugin failures: everything a plugin raises is
//! translated into the runtime error taxonomy and a state transition.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use scribe_bus::EventBus;
use scribe_core::event::types as event_types;
use scribe_core::{
    BusEvent, HealthReport, LifecycleState, OperationParams, PluginConfig, PluginDescriptor,
    PluginError, PluginResult, RegistryRecord, RegistryStore,
};
use scribe_loader::{
    LoadedPlugin, LocalLoader, RemoteLoader, SubmissionMetadata, SubmissionValidator,
    ValidationReport, is_remote_path,
};
use scribe_security::SecurityManager;

use crate::instance::PluginInstance;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Lifecycle deadlines.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Deadline for the initialize+start phase of install.
    pub install_timeout: Duration,
    /// Deadline for a standalone start (including re-initialize from error).
    pub start_timeout: Duration,
    /// Deadline for stop.
    pub stop_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            install_timeout: Duration::from_secs(60),
            start_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

// ─── PluginManager ───────────────────────────────────────────────────────────

/// The plugin lifecycle orchestrator.
pub struct PluginManager {
    config: ManagerConfig,
    instances: DashMap<String, Arc<PluginInstance>>,
    states: DashMap<String, LifecycleState>,
    /// Per-plugin lifecycle mutexes. Entries are never removed so a held
    /// guard always refers to the same mutex any concurrent caller sees.
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    bus: Arc<EventBus>,
    security: Arc<SecurityManager>,
    local: LocalLoader,
    remote: Arc<RemoteLoader>,
    validator: SubmissionValidator,
    store: Arc<dyn RegistryStore>,
}

impl PluginManager {
    /// Creates a manager wired to its collaborators.
    pub fn new(
        config: ManagerConfig,
        bus: Arc<EventBus>,
        security: Arc<SecurityManager>,
        remote: Arc<RemoteLoader>,
        store: Arc<dyn RegistryStore>,
    ) -> Self {
        Self {
            config,
            instances: DashMap::new(),
            states: DashMap::new(),
            locks: DashMap::new(),
            bus,
            security,
            local: LocalLoader::new(),
            remote,
            validator: SubmissionValidator::new(),
            store,
        }
    }

    /// The security manager this manager grants through.
    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    /// The event bus this manager publishes to.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ─── Install ─────────────────────────────────────────────────────────────

    /// Installs the bundle at `path` (a filesystem path or an HTTPS URL) with
    /// the given configuration. Returns the plugin id.
    pub async fn install(&self, path: &str, config: PluginConfig) -> PluginResult<String> {
        let loaded = self.load_bundle(path, None).await?;
        self.install_loaded(loaded, config).await
    }

    /// Installs from a remote URL, verifying the bundle against
    /// `expected_checksum` when one is known (e.g. from a repository entry).
    pub async fn install_remote(
        &self,
        url: &str,
        expected_checksum: Option<&str>,
        config: PluginConfig,
    ) -> PluginResult<String> {
        let loaded = self.load_bundle(url, expected_checksum).await?;
        self.install_loaded(loaded, config).await
    }

    async fn install_loaded(
        &self,
        loaded: LoadedPlugin,
        config: PluginConfig,
    ) -> PluginResult<String> {
        let descriptor = loaded.descriptor.clone();
        let id = descriptor.name.clone();

        let lock = self.lifecycle_lock(&id);
        let _guard = lock.lock().await;

        if self.instances.contains_key(&id) {
            return Err(PluginError::conflict(id.as_str()));
        }
        descriptor.validate()?;
        if !self
            .security
            .can_install(&id, &descriptor.required_permissions)
        {
            return Err(PluginError::invalid(
                "descriptor",
                "requests a permission outside the catalog",
            ));
        }

        self.store
            .put(RegistryRecord::new(
                descriptor.clone(),
                loaded.bundle_path.clone(),
                config.clone(),
                LifecycleState::Installing,
            ))
            .await?;
        self.states.insert(id.clone(), LifecycleState::Installing);

        let instance = Arc::new(PluginInstance::new(
            descriptor.clone(),
            loaded.entry,
            loaded.bundle_path,
            config.clone(),
        ));
        self.instances.insert(id.clone(), Arc::clone(&instance));

        let limit = self.config.install_timeout;
        let activation = async {
            instance
                .entry
                .initialize(&config)
                .await
                .map_err(|e| PluginError::lifecycle("initialize", id.as_str(), e.to_string()))?;
            instance
                .entry
                .start()
                .await
                .map_err(|e| PluginError::lifecycle("start", id.as_str(), e.to_string()))
        };
        match tokio::time::timeout(limit, activation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.mark_error(&id).await;
                return Err(e);
            }
            Err(_) => {
                self.mark_error(&id).await;
                return Err(PluginError::timeout("install", limit.as_millis() as u64));
            }
        }

        self.subscribe_declared(&instance);
        self.security.grant(&id, &descriptor.required_permissions);
        let token = self.security.mint_token(&id);
        instance.set_token(token);

        self.set_state(&id, LifecycleState::Active);
        self.update_stored_state(&id, LifecycleState::Active).await;

        self.bus.publish(BusEvent::system(
            event_types::PLUGIN_INSTALLED,
            json!({ "name": id, "version": descriptor.version.to_string() }),
        ));
        info!(plugin = %id, version = %descriptor.version, "Plugin installed");
        Ok(id)
    }

    // ─── Uninstall ───────────────────────────────────────────────────────────

    /// Removes the plugin entirely. Stop failures are swallowed; uninstall
    /// is best-effort once it begins.
    pub async fn uninstall(&self, id: &str) -> PluginResult<()> {
        let lock = self.lifecycle_lock(id);
        let _guard = lock.lock().await;

        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };
        self.set_state(id, LifecycleState::Uninstalling);

        if let Err(e) = self.stop_locked(id, &instance).await {
            warn!(plugin = %id, error = %e, "Stop during uninstall failed; continuing");
        }
        self.bus.unsubscribe_all(id);
        instance.take_subscriptions();

        self.store.delete(id).await?;
        self.security.revoke_all(id);
        self.security.destroy_token(id);

        self.instances.remove(id);
        self.states.remove(id);

        self.bus.publish(BusEvent::system(
            event_types::PLUGIN_UNINSTALLED,
            json!({ "id": id }),
        ));
        info!(plugin = %id, "Plugin uninstalled");
        Ok(())
    }

    // ─── Start / Stop ────────────────────────────────────────────────────────

    /// Starts an inactive plugin, or recovers one from the error state by
    /// re-initializing first. Starting an active plugin is a no-op.
    pub async fn start(&self, id: &str) -> PluginResult<()> {
        let lock = self.lifecycle_lock(id);
        let _guard = lock.lock().await;

        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };

        let state = self.state_of(id);
        match state {
            LifecycleState::Active => {
                debug!(plugin = %id, "Start requested while already active");
                return Ok(());
            }
            LifecycleState::Inactive | LifecycleState::Error => {}
            other => {
                return Err(PluginError::invalid(
                    "state",
                    format!("cannot start plugin '{id}' from state {other}"),
                ));
            }
        }

        let limit = self.config.start_timeout;
        let config = instance.config();
        let recovering = state == LifecycleState::Error;
        let activation = async {
            if recovering {
                instance
                    .entry
                    .initialize(&config)
                    .await
                    .map_err(|e| PluginError::lifecycle("initialize", id, e.to_string()))?;
            }
            instance
                .entry
                .start()
                .await
                .map_err(|e| PluginError::lifecycle("start", id, e.to_string()))
        };
        match tokio::time::timeout(limit, activation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.mark_error(id).await;
                return Err(e);
            }
            Err(_) => {
                self.mark_error(id).await;
                return Err(PluginError::timeout("start", limit.as_millis() as u64));
            }
        }

        self.subscribe_declared(&instance);
        self.set_state(id, LifecycleState::Active);
        self.update_stored_state(id, LifecycleState::Active).await;
        info!(plugin = %id, "Plugin started");
        Ok(())
    }

    /// Stops an active plugin. Stopping a plugin that is not active is a
    /// no-op.
    pub async fn stop(&self, id: &str) -> PluginResult<()> {
        let lock = self.lifecycle_lock(id);
        let _guard = lock.lock().await;

        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };
        self.stop_locked(id, &instance).await
    }

    /// Stop with the per-id lifecycle lock already held.
    async fn stop_locked(&self, id: &str, instance: &Arc<PluginInstance>) -> PluginResult<()> {
        if self.state_of(id) != LifecycleState::Active {
            debug!(plugin = %id, "Stop requested while not active");
            return Ok(());
        }

        // Events first: a stopped plugin must not keep receiving deliveries.
        self.bus.unsubscribe_all(id);
        instance.take_subscriptions();

        let limit = self.config.stop_timeout;
        match tokio::time::timeout(limit, instance.entry.stop()).await {
            Ok(Ok(())) => {
                self.set_state(id, LifecycleState::Inactive);
                self.update_stored_state(id, LifecycleState::Inactive).await;
                info!(plugin = %id, "Plugin stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.mark_error(id).await;
                Err(PluginError::lifecycle("stop", id, e.to_string()))
            }
            Err(_) => {
                self.mark_error(id).await;
                Err(PluginError::timeout("stop", limit.as_millis() as u64))
            }
        }
    }

    // ─── Bootstrap / Shutdown ────────────────────────────────────────────────

    /// Restores every registry record whose last-known state is Active. A
    /// failure leaves that record in the error state and moves on.
    pub async fn bootstrap(&self) -> PluginResult<()> {
        let records = self.store.list_active().await?;
        info!(count = records.len(), "Bootstrapping previously active plugins");
        for record in records {
            let id = record.id.clone();
            if let Err(e) = self.restore(record).await {
                error!(plugin = %id, error = %e, "Bootstrap failed; plugin left in error state");
            }
        }
        Ok(())
    }

    async fn restore(&self, record: RegistryRecord) -> PluginResult<()> {
        let path = record.bundle_path.to_string_lossy().into_owned();
        let loaded = self.load_bundle(&path, None).await?;
        let id = record.id.clone();

        let lock = self.lifecycle_lock(&id);
        let _guard = lock.lock().await;

        if self.instances.contains_key(&id) {
            return Err(PluginError::conflict(id.as_str()));
        }

        let config = record.config.clone();
        let instance = Arc::new(PluginInstance::new(
            record.descriptor.clone(),
            loaded.entry,
            record.bundle_path.clone(),
            config.clone(),
        ));
        self.instances.insert(id.clone(), Arc::clone(&instance));
        self.states.insert(id.clone(), LifecycleState::Installing);

        let limit = self.config.install_timeout;
        let activation = async {
            instance
                .entry
                .initialize(&config)
                .await
                .map_err(|e| PluginError::lifecycle("initialize", id.as_str(), e.to_string()))?;
            instance
                .entry
                .start()
                .await
                .map_err(|e| PluginError::lifecycle("start", id.as_str(), e.to_string()))
        };
        match tokio::time::timeout(limit, activation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.mark_error(&id).await;
                return Err(e);
            }
            Err(_) => {
                self.mark_error(&id).await;
                return Err(PluginError::timeout("bootstrap", limit.as_millis() as u64));
            }
        }

        self.subscribe_declared(&instance);
        self.security
            .grant(&id, &record.descriptor.required_permissions);
        let token = self.security.mint_token(&id);
        instance.set_token(token);
        self.set_state(&id, LifecycleState::Active);
        debug!(plugin = %id, "Plugin restored");
        Ok(())
    }

    /// Stops every active plugin and clears the in-memory maps. Individual
    /// stop failures are logged, not propagated.
    pub async fn shutdown(&self) {
        self.bus.publish(BusEvent::system(
            event_types::APPLICATION_STOPPING,
            json!({}),
        ));

        let active: Vec<String> = self
            .states
            .iter()
            .filter(|e| *e.value() == LifecycleState::Active)
            .map(|e| e.key().clone())
            .collect();
        for id in active {
            if let Err(e) = self.stop(&id).await {
                warn!(plugin = %id, error = %e, "Stop during shutdown failed");
            }
        }

        self.instances.clear();
        self.states.clear();
        info!("Plugin manager shut down");
    }

    // ─── Queries & auxiliary operations ──────────────────────────────────────

    /// Current lifecycle state; Unknown for ids the manager has never seen.
    pub fn status(&self, id: &str) -> LifecycleState {
        self.state_of(id)
    }

    /// Ids of every installed plugin.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    /// The immutable descriptor of an installed plugin.
    pub fn descriptor(&self, id: &str) -> PluginResult<PluginDescriptor> {
        self.instances
            .get(id)
            .map(|e| e.value().descriptor.clone())
            .ok_or_else(|| PluginError::not_found(id))
    }

    /// Capability tags advertised by an installed plugin.
    pub fn capabilities(&self, id: &str) -> PluginResult<Vec<String>> {
        self.instances
            .get(id)
            .map(|e| e.value().entry.capabilities())
            .ok_or_else(|| PluginError::not_found(id))
    }

    /// The token currently identifying `id`, if the plugin is installed.
    pub fn token(&self, id: &str) -> PluginResult<String> {
        self.instances
            .get(id)
            .map(|e| e.value().token())
            .ok_or_else(|| PluginError::not_found(id))
    }

    /// Resolves a presented token to a plugin id.
    pub fn verify_token(&self, token: &str) -> PluginResult<String> {
        self.security
            .lookup_by_token(token)
            .ok_or_else(|| PluginError::unauthorized("token does not identify any plugin"))
    }

    /// Health of one plugin; missing plugins report Unknown, a failed check
    /// reports Unhealthy.
    pub async fn health(&self, id: &str) -> HealthReport {
        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return HealthReport::unknown(format!("plugin '{id}' not found"));
        };
        match instance.entry.health_check().await {
            Ok(report) => report,
            Err(e) => HealthReport::unhealthy(e.to_string()),
        }
    }

    /// Health of every installed plugin.
    pub async fn health_all(&self) -> HashMap<String, HealthReport> {
        let mut out = HashMap::new();
        for id in self.plugin_ids() {
            let report = self.health(&id).await;
            out.insert(id, report);
        }
        out
    }

    /// Re-initializes an installed plugin with a new configuration.
    pub async fn initialize(&self, id: &str, config: PluginConfig) -> PluginResult<()> {
        let lock = self.lifecycle_lock(id);
        let _guard = lock.lock().await;

        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };
        instance.set_config(config.clone());
        self.update_stored_config(id, &config).await;

        let limit = self.config.start_timeout;
        match tokio::time::timeout(limit, instance.entry.initialize(&config)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.mark_error(id).await;
                Err(PluginError::lifecycle("initialize", id, e.to_string()))
            }
            Err(_) => {
                self.mark_error(id).await;
                Err(PluginError::timeout("initialize", limit.as_millis() as u64))
            }
        }
    }

    /// Replaces an installed plugin's configuration without re-initializing.
    pub async fn configure(&self, id: &str, config: PluginConfig) -> PluginResult<()> {
        let lock = self.lifecycle_lock(id);
        let _guard = lock.lock().await;

        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };
        instance.set_config(config.clone());
        self.update_stored_config(id, &config).await;
        Ok(())
    }

    /// The current configuration of an installed plugin.
    pub fn get_configuration(&self, id: &str) -> PluginResult<PluginConfig> {
        self.instances
            .get(id)
            .map(|e| e.value().config())
            .ok_or_else(|| PluginError::not_found(id))
    }

    /// Dispatches a named operation to an installed plugin.
    pub async fn execute(
        &self,
        id: &str,
        operation: &str,
        params: &OperationParams,
    ) -> PluginResult<String> {
        let Some(instance) = self.instances.get(id).map(|e| Arc::clone(e.value())) else {
            return Err(PluginError::not_found(id));
        };
        instance.entry.execute(operation, params).await
    }

    /// Screens a candidate bundle submission before install.
    pub fn validate_submission(
        &self,
        bundle_path: &Path,
        metadata: &SubmissionMetadata,
    ) -> ValidationReport {
        self.validator.validate(bundle_path, metadata)
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn load_bundle(
        &self,
        path: &str,
        expected_checksum: Option<&str>,
    ) -> PluginResult<LoadedPlugin> {
        if is_remote_path(path) {
            self.remote.load(path, expected_checksum).await
        } else {
            self.local.load(Path::new(path))
        }
    }

    fn lifecycle_lock(&self, id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn state_of(&self, id: &str) -> LifecycleState {
        self.states
            .get(id)
            .map(|s| *s.value())
            .unwrap_or(LifecycleState::Unknown)
    }

    fn set_state(&self, id: &str, to: LifecycleState) {
        if let Some(prev) = self.states.get(id).map(|s| *s.value()) {
            if !prev.can_transition(to) {
                warn!(plugin = %id, from = %prev, to = %to, "Unexpected lifecycle transition");
            }
        }
        self.states.insert(id.to_string(), to);
    }

    async fn mark_error(&self, id: &str) {
        self.set_state(id, LifecycleState::Error);
        self.update_stored_state(id, LifecycleState::Error).await;
    }

    async fn update_stored_state(&self, id: &str, state: LifecycleState) {
        match self.store.get(id).await {
            Ok(Some(mut record)) => {
                record.last_known_state = state;
                record.updated_at = SystemTime::now();
                if let Err(e) = self.store.put(record).await {
                    warn!(plugin = %id, error = %e, "Failed to persist plugin state");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(plugin = %id, error = %e, "Failed to read plugin record"),
        }
    }

    async fn update_stored_config(&self, id: &str, config: &PluginConfig) {
        match self.store.get(id).await {
            Ok(Some(mut record)) => {
                record.config = config.clone();
                record.updated_at = SystemTime::now();
                if let Err(e) = self.store.put(record).await {
                    warn!(plugin = %id, error = %e, "Failed to persist plugin config");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(plugin = %id, error = %e, "Failed to read plugin record"),
        }
    }

    /// Subscribes the plugin's handler to its declared event types.
    fn subscribe_declared(&self, instance: &Arc<PluginInstance>) {
        let Some(handler) = instance.entry.event_handler() else {
            return;
        };
        for event_type in &instance.descriptor.subscribed_events {
            let sub = self
                .bus
                .subscribe(event_type.clone(), instance.id(), handler.clone());
            instance.add_subscription(sub);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! The plugin entry interface: the seam between the host and plugin code.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::event::SharedHandler;

/// Plugin configuration: string keys to opaque values.
pub type PluginConfig = HashMap<String, serde_json::Value>;

/// Operation parameters for [`PluginEntry::execute`].
pub type OperationParams = HashMap<String, String>;

/// Health classification reported by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Plugin reports itself operational.
    Healthy,
    /// Plugin reports a problem, or its health check failed.
    Unhealthy,
    /// The host could not determine health (e.g. plugin missing).
    Unknown,
}

/// Result of a plugin health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Health classification.
    pub status: HealthStatus,
    /// Free-form detail.
    pub message: String,
}

impl HealthReport {
    /// A healthy report with the given detail.
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
        }
    }

    /// An unhealthy report with the given detail.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
        }
    }

    /// An unknown report with the given detail.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            message: message.into(),
        }
    }
}

/// The entry object every plugin exposes to the host.
///
/// The host constructs the entry during load without running any plugin code
/// beyond the constructor; `initialize` is the first lifecycle call. All
/// methods may fail with a [`PluginError`]; the manager translates failures
/// into lifecycle state changes and never panics.
///
/// Event delivery is a separate, optional capability: plugins that want
/// events return a handler from [`event_handler`](Self::event_handler).
#[async_trait]
pub trait PluginEntry: Send + Sync {
    /// Returns the plugin's immutable descriptor.
    fn info(&self) -> PluginDescriptor;

    /// Initializes the plugin with its configuration. Called once per install
    /// and again when recovering from the error state.
    async fn initialize(&self, config: &PluginConfig) -> PluginResult<()>;

    /// Starts the plugin.
    async fn start(&self) -> PluginResult<()>;

    /// Stops the plugin.
    async fn stop(&self) -> PluginResult<()>;

    /// Reports plugin health. Errors are mapped to
    /// [`HealthStatus::Unhealthy`] by the host.
    async fn health_check(&self) -> PluginResult<HealthReport> {
        Ok(HealthReport::healthy(""))
    }

    /// Free-form feature tags the plugin provides.
    fn capabilities(&self) -> Vec<String> {
        self.info().capabilities
    }

    /// Permissions the plugin needs from the catalog.
    fn required_permissions(&self) -> Vec<String> {
        self.info().required_permissions
    }

    /// Event types the plugin wants delivered.
    fn subscribed_events(&self) -> Vec<String> {
        self.info().subscribed_events
    }

    /// Event types the plugin intends to publish.
    fn published_events(&self) -> Vec<String> {
        self.info().published_events
    }

    /// The plugin's event sink, if it handles events at all.
    fn event_handler(&self) -> Option<SharedHandler> {
        None
    }

    /// Named-operation escape hatch used by the gRPC `Execute` RPC.
    async fn execute(&self, operation: &str, _params: &OperationParams) -> PluginResult<String> {
        Err(PluginError::invalid(
            "operation",
            format!("unsupported operation '{operation}'"),
        ))
    }
}

/// Shared handle to a plugin entry.
pub type SharedEntry = Arc<dyn PluginEntry>;

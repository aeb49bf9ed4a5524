//! Bus events and the subscriber-side handler interface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PluginResult;

/// Origin recorded on events published by the host itself.
pub const SYSTEM_ORIGIN: &str = "system";

/// Well-known event types published by the runtime.
pub mod types {
    /// Published after a successful install; payload carries name and version.
    pub const PLUGIN_INSTALLED: &str = "system.plugin.installed";
    /// Published after an uninstall; payload carries the plugin id.
    pub const PLUGIN_UNINSTALLED: &str = "system.plugin.uninstalled";
    /// Published once at the start of host shutdown.
    pub const APPLICATION_STOPPING: &str = "system.application.stopping";
}

/// A typed, ordered notification delivered through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    /// Dotted event type, e.g. `note.created`.
    pub event_type: String,
    /// Plugin id of the producer, or [`SYSTEM_ORIGIN`].
    pub origin: String,
    /// Monotonically assigned by the bus at publish time.
    pub sequence: u64,
    /// Opaque payload.
    pub payload: serde_json::Value,
}

impl BusEvent {
    /// Creates an event with an unassigned sequence number.
    ///
    /// The bus overwrites `sequence` when the event is published.
    pub fn new(
        event_type: impl Into<String>,
        origin: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            origin: origin.into(),
            sequence: 0,
            payload,
        }
    }

    /// Creates a host-originated event.
    pub fn system(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(event_type, SYSTEM_ORIGIN, payload)
    }
}

/// Subscriber-side event sink, consumed from plugins.
///
/// Plugins that do not expose a handler are silently skipped during delivery.
/// Returning an error (or panicking) never reaches the publisher; the failure
/// is logged and counted against the subscribing plugin.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one delivered event.
    async fn on_event(&self, event: BusEvent) -> PluginResult<()>;
}

/// Shared handle to an event handler.
pub type SharedHandler = Arc<dyn EventHandler>;

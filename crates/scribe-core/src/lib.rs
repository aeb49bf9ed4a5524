//! Core types for the Scribe plugin runtime.
//!
//! This crate defines the data model shared by every other runtime crate:
//!
//! - [`PluginDescriptor`]: the immutable metadata a plugin declares
//! - [`PluginEntry`]: the lifecycle seam between host and plugin code
//! - [`LifecycleState`]: the install/start/stop/uninstall state machine
//! - [`BusEvent`] / [`EventHandler`]: event bus payloads and the subscriber
//!   interface
//! - [`PluginError`] / [`ErrorKind`]: the runtime-wide error taxonomy
//! - [`RegistryStore`]: the persistent-catalog contract
//! - [`builtin`]: the linkme registry of compile-time linked entry points

pub mod builtin;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod event;
pub mod registry;
pub mod state;

pub use descriptor::{
    PLUGIN_API_VERSION, PluginDescriptor, PluginKind, RuntimeHint, api_series_compatible,
};
pub use entry::{
    HealthReport, HealthStatus, OperationParams, PluginConfig, PluginEntry, SharedEntry,
};
pub use error::{ErrorKind, PluginError, PluginResult};
pub use event::{BusEvent, EventHandler, SYSTEM_ORIGIN, SharedHandler};
pub use registry::{RegistryRecord, RegistryStore};
pub use state::LifecycleState;

//! # Scribe plugin runtime
//!
//! The subsystem of the Scribe note platform that discovers, validates,
//! installs, starts and stops, capability-sandboxes, and dispatches events to
//! third-party plugins, local or remotely fetched, plus the gRPC surface that
//! exposes these operations to out-of-process plugins.
//!
//! ## Architecture
//!
//! ```text
//! install path:  caller ─► PluginManager ─► SubmissionValidator
//!                              │                (screening)
//!                              ├─► Local/RemoteLoader (bundle ─► entry)
//!                              ├─► SecurityManager   (grant + token)
//!                              └─► EventBus          (declared subscriptions)
//!
//! event path:    producer ─► EventBus ─► per-subscriber worker ─► handler
//! api-call path: caller ─► token check ─► endpoint permission ─► dispatch
//! ```
//!
//! - [`scribe_core`]: descriptors, lifecycle states, entry trait, errors
//! - [`scribe_bus`]: publish/subscribe with per-subscriber FIFO delivery
//! - [`scribe_security`]: permission catalog, grants, tokens
//! - [`scribe_loader`]: local/remote bundle loading and submission screening
//! - [`scribe_repository`]: multi-registry plugin discovery
//! - [`scribe_manager`]: the lifecycle state machine
//! - [`scribe_grpc`]: the `PluginService` wire surface
//! - [`scribe_runtime`]: configuration, logging, host wiring
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use scribe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> scribe_core::PluginResult<()> {
//!     let config = scribe_runtime::config::load_config()
//!         .expect("invalid scribe.yaml");
//!     let runtime = ScribeRuntime::new(config)?;
//!
//!     let id = runtime
//!         .manager()
//!         .install("./plugins/audit-log", Default::default())
//!         .await?;
//!     tracing::info!(plugin = %id, "installed");
//!
//!     runtime.run().await
//! }
//! ```

pub use scribe_bus;
pub use scribe_core;
pub use scribe_grpc;
pub use scribe_loader;
pub use scribe_manager;
pub use scribe_repository;
pub use scribe_runtime;
pub use scribe_security;

/// The commonly used surface in one import.
pub mod prelude {
    // Runtime - main entry point
    pub use scribe_runtime::{HostConfig, ScribeRuntime};

    // Lifecycle orchestration
    pub use scribe_manager::{ManagerConfig, PluginManager};

    // Plugin-side traits and types
    pub use scribe_core::{
        BusEvent, EventHandler, HealthReport, HealthStatus, LifecycleState, PluginConfig,
        PluginDescriptor, PluginEntry, PluginError, PluginResult,
    };

    // Built-in entry registration
    pub use scribe_core::builtin::{BUILTIN_ENTRIES, BuiltinEntry};

    // Event bus and security, for hosts embedding the runtime piecemeal
    pub use scribe_bus::EventBus;
    pub use scribe_security::SecurityManager;

    // Discovery and loading
    pub use scribe_loader::{RemoteLoader, SubmissionValidator};
    pub use scribe_repository::RepositoryClient;
}

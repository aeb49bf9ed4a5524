//! Host runtime for the Scribe plugin system.
//!
//! Provides configuration loading ([`config`]), logging setup ([`logging`]),
//! and the [`ScribeRuntime`] that wires every runtime component together and
//! drives startup, the gRPC surface, and signal-driven shutdown.

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, HostConfig, load_config, load_config_from_file, parse_config};
pub use logging::LoggingBuilder;
pub use runtime::ScribeRuntime;

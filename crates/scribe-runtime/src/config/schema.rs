//! Host configuration schema (`scribe.yaml`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use scribe_loader::{MAX_BUNDLE_SIZE, default_blocked_patterns};

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HostConfig {
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Installed-plugin registry persistence.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Remote bundle loading.
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Plugin discovery repositories.
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    /// Lifecycle deadlines.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// gRPC surface.
    #[serde(default)]
    pub grpc: GrpcConfig,
}

/// Logging knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, or error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Registry-store knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegistryConfig {
    /// JSON file backing the registry. Absent means in-memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Remote-loader knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoaderConfig {
    /// Bundle cache directory.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// Maximum accepted bundle size in bytes.
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size_bytes: u64,
    /// TCP connect deadline in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Response read deadline in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Host patterns refused before any network I/O.
    #[serde(default = "default_blocked_patterns")]
    pub blocked_host_patterns: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            max_bundle_size_bytes: default_max_bundle_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            blocked_host_patterns: default_blocked_patterns(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join("remote-plugins")
}

fn default_max_bundle_size() -> u64 {
    MAX_BUNDLE_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_read_timeout_ms() -> u64 {
    60_000
}

/// Repository knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RepositoriesConfig {
    /// Repository base URLs, queried in order.
    #[serde(default)]
    pub default_repositories: Vec<String>,
}

/// Lifecycle deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Install (and start) deadline.
    #[serde(default = "default_install_timeout_ms")]
    pub install_timeout_ms: u64,
    /// Stop deadline.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            install_timeout_ms: default_install_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

fn default_install_timeout_ms() -> u64 {
    60_000
}

fn default_stop_timeout_ms() -> u64 {
    30_000
}

/// gRPC surface knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GrpcConfig {
    /// Whether to serve the plugin service at all.
    #[serde(default = "default_grpc_enabled")]
    pub enabled: bool,
    /// Listen address for the plugin service.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: default_grpc_enabled(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_grpc_enabled() -> bool {
    true
}

fn default_listen_addr() -> String {
    "127.0.0.1:50061".to_string()
}

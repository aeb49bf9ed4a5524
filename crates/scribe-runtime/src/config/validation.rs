//! Host configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::HostConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];

/// Checks every recognized knob for a usable value.
pub fn validate_config(config: &HostConfig) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        return Err(ConfigError::InvalidValue(format!(
            "unknown log level '{}'",
            config.logging.level
        )));
    }

    if config.loader.max_bundle_size_bytes == 0 {
        return Err(ConfigError::InvalidValue(
            "max-bundle-size-bytes must be positive".into(),
        ));
    }
    if config.loader.connect_timeout_ms == 0 || config.loader.read_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "loader timeouts must be positive".into(),
        ));
    }
    if config.lifecycle.install_timeout_ms == 0 || config.lifecycle.stop_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "lifecycle timeouts must be positive".into(),
        ));
    }

    for url in &config.repositories.default_repositories {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "repository '{url}' is not an http(s) URL"
            )));
        }
    }

    if config.grpc.enabled && config.grpc.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::InvalidValue(format!(
            "grpc listen-addr '{}' is not a socket address",
            config.grpc.listen_addr
        )));
    }

    Ok(())
}

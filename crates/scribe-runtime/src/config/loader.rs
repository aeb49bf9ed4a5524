//! Configuration file loading.
//!
//! The host reads a single `scribe.yaml`. Resolution order:
//!
//! 1. the file named by the `SCRIBE_CONFIG` environment variable, when set
//!    (it must exist; a broken override should not silently fall through);
//! 2. `scribe.yaml` in the current directory;
//! 3. `scribe/scribe.yaml` under the user configuration directory.
//!
//! When none of these exists the compiled-in defaults apply. Values may
//! reference environment variables as `${NAME}` or `${NAME:-fallback}`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::HostConfig;
use super::validation::validate_config;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_VAR: &str = "SCRIBE_CONFIG";

/// Loads the host configuration from the standard locations.
pub fn load_config() -> ConfigResult<HostConfig> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_VAR) {
        debug!(path = %explicit, "Using configuration from {CONFIG_PATH_VAR}");
        return load_config_from_file(explicit);
    }

    match discover() {
        Some(path) => load_config_from_file(path),
        None => {
            info!("No configuration file found, using defaults");
            Ok(HostConfig::default())
        }
    }
}

/// Loads and validates the configuration at `path`.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<HostConfig> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    info!("Loading configuration from: {}", path.display());
    let raw = std::fs::read_to_string(path)?;
    parse_config(&raw)
}

/// Parses and validates a YAML configuration document.
pub fn parse_config(yaml: &str) -> ConfigResult<HostConfig> {
    let expanded = expand_env(yaml);
    let config: HostConfig = serde_yaml::from_str(&expanded)?;
    validate_config(&config)?;
    Ok(config)
}

/// First existing configuration file among the standard locations.
fn discover() -> Option<PathBuf> {
    let local = PathBuf::from("scribe.yaml");
    if local.is_file() {
        debug!("Found configuration file: {}", local.display());
        return Some(local);
    }

    let user = dirs::config_dir()?.join("scribe").join("scribe.yaml");
    if user.is_file() {
        debug!("Found configuration file: {}", user.display());
        return Some(user);
    }
    None
}

/// Substitutes `${NAME}` and `${NAME:-fallback}` with environment values.
///
/// An unset variable without a fallback expands to the empty string. A `${`
/// with no closing brace is copied through untouched.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let (name, fallback) = match tail[..end].split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (&tail[..end], None),
        };
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(fallback.unwrap_or_default()),
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.lifecycle.stop_timeout_ms, 30_000);
        assert!(config.grpc.enabled);
    }

    #[test]
    fn partial_yaml_overrides_defaults() {
        let yaml = r#"
logging:
  level: debug
lifecycle:
  stop-timeout-ms: 10000
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.lifecycle.stop_timeout_ms, 10_000);
        assert_eq!(config.lifecycle.install_timeout_ms, 60_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("surprise: true\n").is_err());
    }

    #[test]
    fn fallback_is_used_when_variable_is_unset() {
        let yaml = r#"
grpc:
  listen-addr: ${SCRIBE_TEST_UNSET_ADDR:-127.0.0.1:50099}
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.grpc.listen_addr, "127.0.0.1:50099");
    }

    #[test]
    fn unset_variable_without_fallback_becomes_empty() {
        assert_eq!(
            expand_env("x=${SCRIBE_TEST_UNSET_VALUE}!"),
            "x=!".to_string()
        );
    }

    #[test]
    fn unterminated_reference_is_copied_through() {
        assert_eq!(expand_env("x=${OOPS"), "x=${OOPS".to_string());
    }

    #[test]
    fn expansion_handles_multiple_references() {
        let expanded = expand_env("${A:-1}-${B:-2}-${C:-3}");
        assert_eq!(expanded, "1-2-3");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_config_from_file("/nonexistent/scribe.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}

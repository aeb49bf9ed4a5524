//! Plugin descriptors: the immutable metadata a plugin declares.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Plugin API version this host implements.
///
/// Bundles declare the API version they were built against; only bundles in
/// the same major series are compatible.
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Whether a declared API version belongs to this host's major series.
pub fn api_series_compatible(declared: &str) -> bool {
    let host_major = PLUGIN_API_VERSION.split('.').next().unwrap_or("");
    match declared.split('.').next() {
        Some(major) if !major.is_empty() => major == host_major,
        _ => false,
    }
}

/// Whether a plugin runs inside the host process or reaches it over gRPC.
///
/// Both kinds share one lifecycle path; the kind is recorded and surfaced so
/// operators can tell linked modules from remotely attached ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Compile-time linked module registered in the built-in entry registry.
    Internal,
    /// Out-of-process plugin attached through the gRPC surface.
    External,
}

/// Hint describing how the plugin's code is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeHint {
    /// A packaged bundle loaded from the filesystem or a remote URL.
    Bundle,
    /// A long-running service the host only coordinates with.
    Service,
}

/// The immutable metadata a plugin declares.
///
/// A descriptor is read-only for the lifetime of the installed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin name; doubles as the plugin id across the runtime.
    pub name: String,
    /// Semantic version, optional pre-release allowed.
    pub version: Version,
    /// In-process vs. gRPC-attached.
    pub kind: PluginKind,
    /// How the plugin's code is delivered.
    pub runtime: RuntimeHint,
    /// Author or organization.
    #[serde(default)]
    pub author: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Free-form feature tags the plugin advertises.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Permissions the plugin needs, drawn from the fixed catalog.
    #[serde(default)]
    pub required_permissions: Vec<String>,
    /// Event types the plugin wants delivered to it.
    #[serde(default)]
    pub subscribed_events: Vec<String>,
    /// Event types the plugin intends to publish.
    #[serde(default)]
    pub published_events: Vec<String>,
}

impl PluginDescriptor {
    /// Structural validation: name present and version non-zero-length.
    ///
    /// Permission membership in the catalog is the security manager's call,
    /// not the descriptor's.
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.trim().is_empty() {
            return Err(PluginError::invalid("descriptor", "name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            version: Version::new(1, 0, 0),
            kind: PluginKind::Internal,
            runtime: RuntimeHint::Bundle,
            author: String::new(),
            description: String::new(),
            capabilities: vec![],
            required_permissions: vec![],
            subscribed_events: vec![],
            published_events: vec![],
        }
    }

    #[test]
    fn empty_name_is_invalid() {
        assert!(descriptor("  ").validate().is_err());
        assert!(descriptor("sample").validate().is_ok());
    }

    #[test]
    fn api_series_check_uses_major_only() {
        assert!(api_series_compatible("1.0.0"));
        assert!(api_series_compatible("1.9.3"));
        assert!(!api_series_compatible("2.0.0"));
        assert!(!api_series_compatible(""));
        assert!(!api_series_compatible(".1"));
    }

    #[test]
    fn round_trips_through_json() {
        let d = descriptor("sample");
        let json = serde_json::to_string(&d).unwrap();
        let back: PluginDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}

//! Local loader: opens a bundle from the filesystem and resolves its single
//! entry point against the built-in entry registry.
//!
//! No code from the bundle runs during load; the entry object is constructed
//! by its registered factory but not initialized.

use std::path::{Path, PathBuf};

use tracing::debug;

use scribe_core::builtin::find_builtin;
use scribe_core::{PluginDescriptor, PluginError, PluginResult, SharedEntry, api_series_compatible};

use crate::bundle::Bundle;

/// The outcome of a successful load: descriptor + uninitialized entry object.
pub struct LoadedPlugin {
    /// Descriptor from the bundle manifest.
    pub descriptor: PluginDescriptor,
    /// The constructed, uninitialized entry object.
    pub entry: SharedEntry,
    /// The bundle path the plugin was loaded from.
    pub bundle_path: PathBuf,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("descriptor", &self.descriptor)
            .field("bundle_path", &self.bundle_path)
            .finish_non_exhaustive()
    }
}

/// Loads bundles from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalLoader;

impl LocalLoader {
    /// Creates a loader.
    pub fn new() -> Self {
        Self
    }

    /// Opens the bundle at `path` and resolves its entry point.
    ///
    /// Fails with Invalid when the bundle declares zero entry points
    /// ("none"), more than one ("ambiguous"), an entry point unknown to the
    /// built-in registry, or an API version outside the host series.
    pub fn load(&self, path: impl AsRef<Path>) -> PluginResult<LoadedPlugin> {
        let path = path.as_ref();
        let bundle = Bundle::open(path)?;
        let manifest = bundle.manifest();

        if !api_series_compatible(&manifest.api_version) {
            return Err(PluginError::invalid(
                "bundle",
                format!(
                    "api version '{}' is outside the supported series",
                    manifest.api_version
                ),
            ));
        }

        let entry_name = match manifest.entry.as_slice() {
            [] => {
                return Err(PluginError::invalid(
                    "bundle",
                    "no entry point declared",
                ));
            }
            [single] => single.as_str(),
            many => {
                return Err(PluginError::invalid(
                    "bundle",
                    format!("ambiguous: {} entry points declared", many.len()),
                ));
            }
        };

        let builtin = find_builtin(entry_name).ok_or_else(|| {
            PluginError::invalid(
                "bundle",
                format!("entry point '{entry_name}' is not linked into this host"),
            )
        })?;

        let descriptor = manifest.to_descriptor()?;
        let entry = (builtin.create)();
        debug!(
            plugin = %descriptor.name,
            entry = %entry_name,
            path = %path.display(),
            "Loaded bundle"
        );

        Ok(LoadedPlugin {
            descriptor,
            entry,
            bundle_path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use linkme::distributed_slice;
    use tempfile::TempDir;

    use scribe_core::builtin::{BUILTIN_ENTRIES, BuiltinEntry};
    use scribe_core::{ErrorKind, PluginConfig, PluginDescriptor, PluginEntry, PluginKind,
        RuntimeHint};

    struct NullEntry;

    #[async_trait]
    impl PluginEntry for NullEntry {
        fn info(&self) -> PluginDescriptor {
            PluginDescriptor {
                name: "sample-logging-plugin".into(),
                version: semver::Version::new(1, 0, 0),
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

        async fn initialize(&self, _config: &PluginConfig) -> PluginResult<()> {
            Ok(())
        }

        async fn start(&self) -> PluginResult<()> {
            Ok(())
        }

        async fn stop(&self) -> PluginResult<()> {
            Ok(())
        }
    }

    #[distributed_slice(BUILTIN_ENTRIES)]
    static SAMPLE: BuiltinEntry = BuiltinEntry {
        name: "sample-logging-plugin",
        create: || Arc::new(NullEntry),
    };

    fn write_bundle(dir: &std::path::Path, entries: &[&str]) {
        let entry_yaml = entries
            .iter()
            .map(|e| format!("  - {e}\n"))
            .collect::<String>();
        let manifest = format!(
            "name: sample-logging-plugin\nversion: 1.0.0\napi-version: 1.0.0\nentry:\n{entry_yaml}"
        );
        std::fs::write(dir.join(crate::bundle::MANIFEST_NAME), manifest).unwrap();
    }

    #[test]
    fn resolves_single_declared_entry() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), &["sample-logging-plugin"]);

        let loaded = LocalLoader::new().load(tmp.path()).unwrap();
        assert_eq!(loaded.descriptor.name, "sample-logging-plugin");
        assert_eq!(loaded.bundle_path, tmp.path());
    }

    #[test]
    fn zero_entries_is_invalid() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(crate::bundle::MANIFEST_NAME),
            "name: x\nversion: 1.0.0\napi-version: 1.0.0\n",
        )
        .unwrap();
        let err = LocalLoader::new().load(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn two_entries_is_ambiguous() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), &["sample-logging-plugin", "other"]);
        let err = LocalLoader::new().load(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn unknown_entry_is_invalid() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), &["never-registered"]);
        let err = LocalLoader::new().load(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn wrong_api_series_is_invalid() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(crate::bundle::MANIFEST_NAME),
            "name: x\nversion: 1.0.0\napi-version: 2.0.0\nentry:\n  - sample-logging-plugin\n",
        )
        .unwrap();
        let err = LocalLoader::new().load(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}

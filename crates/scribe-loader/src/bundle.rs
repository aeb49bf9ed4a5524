//! Bundle representation: manifest parsing and artifact enumeration.
//!
//! A bundle is a self-describing unit of plugin code in one of two forms:
//!
//! - a **directory** containing `plugin.yaml` next to its artifacts, or
//! - a **gzipped tar archive** with the `.qpk` suffix whose root contains
//!   `plugin.yaml`.
//!
//! Opening a bundle reads metadata only; no artifact bytes are touched until
//! a caller asks for them (the submission validator does, the local loader
//! does not).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use scribe_core::{
    PluginDescriptor, PluginError, PluginKind, PluginResult, RuntimeHint,
};

/// File-name suffix of packaged bundles.
pub const BUNDLE_SUFFIX: &str = "qpk";

/// Manifest file at the root of every bundle.
pub const MANIFEST_NAME: &str = "plugin.yaml";

/// Suffix of code-module artifacts referenced by entry points.
pub const MODULE_SUFFIX: &str = "wasm";

// ─── Manifest ────────────────────────────────────────────────────────────────

/// The declared contents of `plugin.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BundleManifest {
    /// Unique plugin name.
    pub name: String,
    /// Semver version string.
    pub version: String,
    /// Plugin API version the bundle was built against.
    pub api_version: String,
    /// Exported entry-point names. Exactly one is required for loading.
    #[serde(default)]
    pub entry: Vec<String>,
    /// In-process vs. gRPC-attached.
    #[serde(default = "default_kind")]
    pub kind: PluginKind,
    /// How the plugin's code is delivered.
    #[serde(default = "default_runtime")]
    pub runtime: RuntimeHint,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Permissions requested from the catalog.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub subscribed_events: Vec<String>,
    #[serde(default)]
    pub published_events: Vec<String>,
}

fn default_kind() -> PluginKind {
    PluginKind::Internal
}

fn default_runtime() -> RuntimeHint {
    RuntimeHint::Bundle
}

impl BundleManifest {
    /// Builds the immutable descriptor from the declared metadata.
    pub fn to_descriptor(&self) -> PluginResult<PluginDescriptor> {
        let version = semver::Version::parse(&self.version).map_err(|e| {
            PluginError::invalid("manifest", format!("version '{}': {e}", self.version))
        })?;
        let descriptor = PluginDescriptor {
            name: self.name.clone(),
            version,
            kind: self.kind,
            runtime: self.runtime,
            author: self.author.clone(),
            description: self.description.clone(),
            capabilities: self.capabilities.clone(),
            required_permissions: self.permissions.clone(),
            subscribed_events: self.subscribed_events.clone(),
            published_events: self.published_events.clone(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// Whether the bundle is a directory tree or a packaged archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleForm {
    /// Unpacked directory with `plugin.yaml` at its root.
    Directory,
    /// Gzipped tar archive with the `.qpk` suffix.
    Archive,
}

/// An opened bundle: parsed manifest plus lazy access to artifacts.
#[derive(Debug)]
pub struct Bundle {
    path: PathBuf,
    form: BundleForm,
    manifest: BundleManifest,
}

impl Bundle {
    /// Opens the bundle at `path`.
    ///
    /// Rejects missing paths, files without the bundle suffix, and bundles
    /// with a missing or malformed manifest.
    pub fn open(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PluginError::invalid(
                "bundle",
                format!("path does not exist: {}", path.display()),
            ));
        }

        if path.is_dir() {
            let manifest_path = path.join(MANIFEST_NAME);
            if !manifest_path.is_file() {
                return Err(PluginError::invalid(
                    "bundle",
                    format!("no {MANIFEST_NAME} in {}", path.display()),
                ));
            }
            let raw = std::fs::read_to_string(&manifest_path)?;
            let manifest = parse_manifest(&raw)?;
            return Ok(Self {
                path: path.to_path_buf(),
                form: BundleForm::Directory,
                manifest,
            });
        }

        if path.extension().and_then(|e| e.to_str()) != Some(BUNDLE_SUFFIX) {
            return Err(PluginError::invalid(
                "bundle",
                format!("not a .{BUNDLE_SUFFIX} bundle: {}", path.display()),
            ));
        }

        let raw = read_archive_entry(path, MANIFEST_NAME)?.ok_or_else(|| {
            PluginError::invalid("bundle", format!("no {MANIFEST_NAME} in archive"))
        })?;
        let raw = String::from_utf8(raw)
            .map_err(|_| PluginError::invalid("manifest", "not valid UTF-8"))?;
        let manifest = parse_manifest(&raw)?;
        Ok(Self {
            path: path.to_path_buf(),
            form: BundleForm::Archive,
            manifest,
        })
    }

    /// The path the bundle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory or archive.
    pub fn form(&self) -> BundleForm {
        self.form
    }

    /// The parsed manifest.
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Relative paths of every artifact in the bundle, manifest excluded.
    pub fn artifact_names(&self) -> PluginResult<Vec<String>> {
        match self.form {
            BundleForm::Directory => {
                let mut names = Vec::new();
                for entry in WalkDir::new(&self.path).into_iter() {
                    let entry = entry.map_err(|e| {
                        PluginError::invalid("bundle", format!("walk failed: {e}"))
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let rel = entry
                        .path()
                        .strip_prefix(&self.path)
                        .map_err(|e| PluginError::internal(e.to_string()))?;
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if rel != MANIFEST_NAME {
                        names.push(rel);
                    }
                }
                names.sort();
                Ok(names)
            }
            BundleForm::Archive => {
                let file = File::open(&self.path)?;
                let mut archive = tar::Archive::new(GzDecoder::new(file));
                let mut names = Vec::new();
                for entry in archive
                    .entries()
                    .map_err(|e| PluginError::invalid("bundle", format!("bad archive: {e}")))?
                {
                    let entry = entry
                        .map_err(|e| PluginError::invalid("bundle", format!("bad entry: {e}")))?;
                    if !entry.header().entry_type().is_file() {
                        continue;
                    }
                    let rel = entry
                        .path()
                        .map_err(|e| PluginError::invalid("bundle", format!("bad path: {e}")))?
                        .to_string_lossy()
                        .replace('\\', "/");
                    if rel != MANIFEST_NAME {
                        names.push(rel);
                    }
                }
                names.sort();
                Ok(names)
            }
        }
    }

    /// Whether an artifact with file name `name` exists anywhere in the bundle.
    pub fn contains_artifact(&self, name: &str) -> PluginResult<bool> {
        Ok(self
            .artifact_names()?
            .iter()
            .any(|rel| rel == name || rel.ends_with(&format!("/{name}"))))
    }

    /// Reads the artifact at relative path `name`.
    pub fn read_artifact(&self, name: &str) -> PluginResult<Vec<u8>> {
        match self.form {
            BundleForm::Directory => Ok(std::fs::read(self.path.join(name))?),
            BundleForm::Archive => read_archive_entry(&self.path, name)?.ok_or_else(|| {
                PluginError::invalid("bundle", format!("no artifact '{name}' in archive"))
            }),
        }
    }

    /// Packs a directory-form bundle into an archive at `dest`.
    ///
    /// Used by tests and by operators preparing submissions.
    pub fn pack(src_dir: impl AsRef<Path>, dest: impl AsRef<Path>) -> PluginResult<()> {
        let src_dir = src_dir.as_ref();
        let dest = dest.as_ref();
        if !src_dir.join(MANIFEST_NAME).is_file() {
            return Err(PluginError::invalid(
                "bundle",
                format!("no {MANIFEST_NAME} in {}", src_dir.display()),
            ));
        }
        let file = File::create(dest)?;
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for entry in WalkDir::new(src_dir).into_iter() {
            let entry =
                entry.map_err(|e| PluginError::invalid("bundle", format!("walk failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(src_dir)
                .map_err(|e| PluginError::internal(e.to_string()))?;
            builder.append_path_with_name(entry.path(), rel)?;
        }
        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| PluginError::internal(format!("failed to finish archive: {e}")))?;
        Ok(())
    }
}

/// Parses and minimally checks a manifest document.
fn parse_manifest(raw: &str) -> PluginResult<BundleManifest> {
    let manifest: BundleManifest = serde_yaml::from_str(raw)
        .map_err(|e| PluginError::invalid("manifest", e.to_string()))?;
    for (field, value) in [
        ("name", &manifest.name),
        ("version", &manifest.version),
        ("api-version", &manifest.api_version),
    ] {
        if value.trim().is_empty() {
            return Err(PluginError::invalid(
                "manifest",
                format!("required attribute '{field}' is empty"),
            ));
        }
    }
    Ok(manifest)
}

/// Reads one entry out of a gzipped tar archive, by exact relative path.
fn read_archive_entry(path: &Path, name: &str) -> PluginResult<Option<Vec<u8>>> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive
        .entries()
        .map_err(|e| PluginError::invalid("bundle", format!("bad archive: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| PluginError::invalid("bundle", format!("bad entry: {e}")))?;
        let rel = entry
            .path()
            .map_err(|e| PluginError::invalid("bundle", format!("bad path: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");
        if rel == name {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    const SAMPLE_MANIFEST: &str = r#"
name: sample-logging-plugin
version: 1.0.0
api-version: 1.0.0
entry:
  - sample-logging-plugin
author: Sample Author
description: Logs note activity
permissions:
  - notes.read
  - system.events.subscribe
subscribed-events:
  - note.created
"#;

    fn write_dir_bundle(dir: &Path) {
        std::fs::write(dir.join(MANIFEST_NAME), SAMPLE_MANIFEST).unwrap();
        std::fs::write(dir.join("sample-logging-plugin.wasm"), b"\0asm stub").unwrap();
    }

    #[test]
    fn opens_directory_bundle() {
        let tmp = TempDir::new().unwrap();
        write_dir_bundle(tmp.path());

        let bundle = Bundle::open(tmp.path()).unwrap();
        assert_eq!(bundle.form(), BundleForm::Directory);
        assert_eq!(bundle.manifest().name, "sample-logging-plugin");
        assert_eq!(
            bundle.artifact_names().unwrap(),
            vec!["sample-logging-plugin.wasm".to_string()]
        );
        assert!(bundle
            .contains_artifact("sample-logging-plugin.wasm")
            .unwrap());
    }

    #[test]
    fn packs_and_reopens_archive() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        write_dir_bundle(&src);

        let dest = tmp.path().join("sample.qpk");
        Bundle::pack(&src, &dest).unwrap();

        let bundle = Bundle::open(&dest).unwrap();
        assert_eq!(bundle.form(), BundleForm::Archive);
        assert_eq!(bundle.manifest().version, "1.0.0");
        assert_eq!(
            bundle.read_artifact("sample-logging-plugin.wasm").unwrap(),
            b"\0asm stub"
        );
    }

    #[test]
    fn missing_path_is_invalid() {
        let err = Bundle::open("/nonexistent/path/x.qpk").unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn wrong_suffix_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bundle.zip");
        std::fs::write(&file, b"junk").unwrap();
        let err = Bundle::open(&file).unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn directory_without_manifest_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = Bundle::open(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn manifest_with_empty_required_attribute_is_invalid() {
        let err = parse_manifest("name: x\nversion: ''\napi-version: 1.0.0\n").unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn descriptor_requires_parseable_version() {
        let mut manifest = parse_manifest(SAMPLE_MANIFEST).unwrap();
        assert!(manifest.to_descriptor().is_ok());
        manifest.version = "one.two".into();
        assert!(manifest.to_descriptor().is_err());
    }
}

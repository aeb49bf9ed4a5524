//! Submission validator: structural and static screening of a candidate
//! bundle before install.
//!
//! The validator never loads or runs the candidate. It checks the submitted
//! metadata, the bundle's structure, and the raw bytes of every artifact, and
//! reports everything it finds at once rather than stopping at the first
//! problem. A submission is accepted iff `errors` is empty; warnings are
//! advisory.

use std::path::Path;

use regex_lite::Regex;
use tracing::debug;

use scribe_core::api_series_compatible;
use scribe_security::screening;

use crate::bundle::{Bundle, MODULE_SUFFIX};
use crate::digest::sha256_file;
use crate::remote::MAX_BUNDLE_SIZE;

/// Maximum submission name length.
const NAME_MAX: usize = 100;

/// Maximum submission description length.
const DESC_MAX: usize = 1000;

/// Artifact suffixes that are never allowed inside a bundle.
const EXECUTABLE_SUFFIXES: &[&str] = &[".exe", ".bat", ".sh", ".dll"];

// ─── Submission input ────────────────────────────────────────────────────────

/// Metadata accompanying a candidate bundle.
#[derive(Debug, Clone, Default)]
pub struct SubmissionMetadata {
    /// Display name of the submission.
    pub name: String,
    /// Declared version, `d.d.d` with optional pre-release.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Contact address of the developer.
    pub developer_email: String,
    /// Marketplace category.
    pub category: String,
    /// Project homepage, if any.
    pub homepage_url: Option<String>,
    /// Source repository, if any.
    pub repository_url: Option<String>,
}

// ─── Validation output ───────────────────────────────────────────────────────

/// The full outcome of validating one submission.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Problems that make the submission unacceptable.
    pub errors: Vec<String>,
    /// Advisory findings.
    pub warnings: Vec<String>,
    /// False when the static screen or the artifact rules flagged anything.
    pub security_ok: bool,
    /// False when the bundle targets a different plugin API series.
    pub compatibility_ok: bool,
    /// Hex SHA-256 of the bundle file, when it exists.
    pub checksum: Option<String>,
    /// Bundle file size in bytes, when it exists.
    pub file_size: u64,
}

impl ValidationReport {
    /// Whether the submission may proceed to install.
    pub fn accepted(&self) -> bool {
        self.errors.is_empty()
    }
}

// ─── Validator ───────────────────────────────────────────────────────────────

/// Validates candidate bundle submissions.
pub struct SubmissionValidator {
    max_bundle_size: u64,
}

impl Default for SubmissionValidator {
    fn default() -> Self {
        Self {
            max_bundle_size: MAX_BUNDLE_SIZE,
        }
    }
}

impl SubmissionValidator {
    /// Creates a validator with the standard size cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator with a custom size cap.
    pub fn with_max_size(max_bundle_size: u64) -> Self {
        Self { max_bundle_size }
    }

    /// Runs every check and returns the combined report.
    pub fn validate(&self, bundle_path: &Path, metadata: &SubmissionMetadata) -> ValidationReport {
        let mut report = ValidationReport {
            security_ok: true,
            compatibility_ok: true,
            ..ValidationReport::default()
        };

        self.check_metadata(metadata, &mut report);
        self.check_bundle(bundle_path, &mut report);

        debug!(
            bundle = %bundle_path.display(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            accepted = report.accepted(),
            "Validated submission"
        );
        report
    }

    // ─── Metadata checks ─────────────────────────────────────────────────────

    fn check_metadata(&self, metadata: &SubmissionMetadata, report: &mut ValidationReport) {
        if metadata.name.trim().is_empty() {
            report.errors.push("name must not be empty".into());
        } else if metadata.name.len() > NAME_MAX {
            report
                .errors
                .push(format!("name exceeds {NAME_MAX} characters"));
        }

        let semver_re = Regex::new(r"^\d+\.\d+\.\d+(-[A-Za-z0-9]+)?$").unwrap();
        if !semver_re.is_match(&metadata.version) {
            report.errors.push(format!(
                "version '{}' is not a semantic version",
                metadata.version
            ));
        }

        if metadata.description.trim().is_empty() {
            report.errors.push("description must not be empty".into());
        } else if metadata.description.len() > DESC_MAX {
            report
                .errors
                .push(format!("description exceeds {DESC_MAX} characters"));
        }

        let email_re = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
        if !email_re.is_match(&metadata.developer_email) {
            report.errors.push(format!(
                "developer email '{}' is not a valid address",
                metadata.developer_email
            ));
        }

        for (label, value) in [
            ("homepage", &metadata.homepage_url),
            ("repository", &metadata.repository_url),
        ] {
            if let Some(value) = value {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    report
                        .warnings
                        .push(format!("{label} URL '{value}' is not an http(s) URL"));
                }
            }
        }
    }

    // ─── Bundle checks ───────────────────────────────────────────────────────

    fn check_bundle(&self, bundle_path: &Path, report: &mut ValidationReport) {
        let Ok(file_meta) = std::fs::metadata(bundle_path) else {
            report.errors.push(format!(
                "bundle file does not exist: {}",
                bundle_path.display()
            ));
            report.compatibility_ok = false;
            return;
        };

        if file_meta.is_file() {
            report.file_size = file_meta.len();
            if report.file_size > self.max_bundle_size {
                report.errors.push(format!(
                    "bundle is {} bytes, over the {} byte cap",
                    report.file_size, self.max_bundle_size
                ));
            }
            match sha256_file(bundle_path) {
                Ok(checksum) => report.checksum = Some(checksum),
                Err(e) => report.errors.push(format!("failed to hash bundle: {e}")),
            }
        }

        let bundle = match Bundle::open(bundle_path) {
            Ok(bundle) => bundle,
            Err(e) => {
                report.errors.push(e.to_string());
                report.compatibility_ok = false;
                return;
            }
        };
        let manifest = bundle.manifest();

        if manifest.entry.is_empty() {
            report
                .errors
                .push("manifest declares no entry point".into());
        }

        if !api_series_compatible(&manifest.api_version) {
            report.compatibility_ok = false;
            report.errors.push(format!(
                "api version '{}' is outside the supported series",
                manifest.api_version
            ));
        }

        let artifacts = match bundle.artifact_names() {
            Ok(artifacts) => artifacts,
            Err(e) => {
                report.errors.push(e.to_string());
                return;
            }
        };

        for entry in &manifest.entry {
            let artifact = format!("{entry}.{MODULE_SUFFIX}");
            let present = artifacts
                .iter()
                .any(|rel| rel == &artifact || rel.ends_with(&format!("/{artifact}")));
            if !present {
                report.errors.push(format!(
                    "declared entry point '{entry}' has no artifact '{artifact}'"
                ));
            }
        }

        for artifact in &artifacts {
            let lower = artifact.to_ascii_lowercase();
            if EXECUTABLE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
                report.security_ok = false;
                report
                    .errors
                    .push(format!("bundle carries executable artifact '{artifact}'"));
            }
        }

        self.screen_artifacts(&bundle, &artifacts, report);
    }

    /// Byte-level screen of every artifact, using the shared rule set.
    fn screen_artifacts(
        &self,
        bundle: &Bundle,
        artifacts: &[String],
        report: &mut ValidationReport,
    ) {
        for artifact in artifacts {
            let bytes = match bundle.read_artifact(artifact) {
                Ok(bytes) => bytes,
                Err(e) => {
                    report
                        .errors
                        .push(format!("failed to read artifact '{artifact}': {e}"));
                    continue;
                }
            };
            for finding in screening::screen_artifact(&bytes) {
                report.security_ok = false;
                report
                    .errors
                    .push(format!("artifact '{artifact}' {finding}"));
            }
        }
    }
}

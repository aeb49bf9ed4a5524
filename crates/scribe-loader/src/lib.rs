//! Bundle loading for the Scribe plugin runtime.
//!
//! Three collaborating pieces live here:
//!
//! - [`LocalLoader`] opens a bundle from the filesystem and resolves its
//!   single entry point against the built-in registry. Only metadata is
//!   read; no plugin code runs during load.
//! - [`RemoteLoader`] fetches a bundle over HTTPS with SSRF, size, and
//!   checksum defenses, caches it content-addressed, and runs every result
//!   (cached or fresh) through the static artifact screen before delegating
//!   to the local loader.
//! - [`SubmissionValidator`] screens a candidate bundle (structure, metadata,
//!   static byte scan) before it is allowed anywhere near install.

pub mod bundle;
mod digest;
pub mod local;
pub mod remote;
pub mod validator;

pub use bundle::{BUNDLE_SUFFIX, Bundle, BundleForm, BundleManifest, MANIFEST_NAME, MODULE_SUFFIX};
pub use local::{LoadedPlugin, LocalLoader};
pub use remote::{
    MAX_BUNDLE_SIZE, RemoteLoader, RemoteLoaderConfig, default_blocked_patterns, is_remote_path,
};
pub use validator::{SubmissionMetadata, SubmissionValidator, ValidationReport};

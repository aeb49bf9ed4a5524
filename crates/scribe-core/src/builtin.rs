//! Built-in entry registry (linkme distributed slice).
//!
//! Internal plugins are compile-time linked modules. Each one contributes a
//! [`BuiltinEntry`] to [`BUILTIN_ENTRIES`]; the local loader resolves a
//! bundle's exported entry-point name against this registry and calls the
//! factory to construct the entry object. Nothing is initialized at
//! construction time.
//!
//! ```rust,ignore
//! use linkme::distributed_slice;
//! use scribe_core::builtin::{BUILTIN_ENTRIES, BuiltinEntry};
//!
//! #[distributed_slice(BUILTIN_ENTRIES)]
//! static AUDIT_LOG: BuiltinEntry = BuiltinEntry {
//!     name: "audit-log",
//!     create: || Arc::new(AuditLogPlugin::new()),
//! };
//! ```

use linkme::distributed_slice;

use crate::entry::SharedEntry;

/// One registered built-in plugin entry point.
pub struct BuiltinEntry {
    /// Entry-point name as declared in bundle manifests.
    pub name: &'static str,
    /// Factory constructing the (uninitialized) entry object.
    pub create: fn() -> SharedEntry,
}

/// Registry of all compile-time linked plugin entry points.
#[distributed_slice]
pub static BUILTIN_ENTRIES: [BuiltinEntry];

/// Looks up a built-in entry point by name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinEntry> {
    BUILTIN_ENTRIES.iter().find(|e| e.name == name)
}

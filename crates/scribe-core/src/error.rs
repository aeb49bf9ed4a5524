//! Unified error types for the Scribe plugin runtime.
//!
//! Every fallible runtime operation returns [`PluginError`]. Each variant maps
//! to exactly one [`ErrorKind`] tag so callers (and the gRPC surface) can
//! report failures without matching on variant payloads.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Error Kind Tags
// =============================================================================

/// Coarse classification of a [`PluginError`].
///
/// The tag is stable and machine-readable; REST collaborators map it onto
/// HTTP status codes (NotFound→404, Conflict→409, Invalid/Unauthorized→400/401,
/// IntegrityFailed/SecurityViolation→422, Timeout/Network→504/502,
/// Internal→500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An operation referenced an unknown plugin id.
    NotFound,
    /// Install collided with an already-active plugin name.
    Conflict,
    /// Malformed descriptor, unknown permission, bad URL, bad bundle.
    Invalid,
    /// A token check failed.
    Unauthorized,
    /// Checksum mismatch or size cap exceeded.
    IntegrityFailed,
    /// DNS/TLS/read failure while talking to a remote host.
    Network,
    /// A static screen or SSRF defense rejected the input.
    SecurityViolation,
    /// A plugin lifecycle method failed or misbehaved.
    Lifecycle,
    /// A bounded operation exceeded its deadline.
    Timeout,
    /// Store I/O or a bug in the host.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::IntegrityFailed => "IntegrityFailed",
            ErrorKind::Network => "NetworkError",
            ErrorKind::SecurityViolation => "SecurityViolation",
            ErrorKind::Lifecycle => "LifecycleFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

// =============================================================================
// PluginError
// =============================================================================

/// Errors raised by the plugin runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin with the given id is known to the manager.
    #[error("plugin '{id}' not found")]
    NotFound {
        /// The unknown plugin id.
        id: String,
    },

    /// A plugin with the same name is already active.
    #[error("plugin '{name}' is already installed")]
    Conflict {
        /// The colliding plugin name.
        name: String,
    },

    /// The input failed structural validation.
    #[error("invalid {what}: {reason}")]
    Invalid {
        /// What was being validated (descriptor, bundle, URL, ...).
        what: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A presented token did not identify any plugin.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Why the check failed.
        reason: String,
    },

    /// Downloaded or cached bytes failed an integrity check.
    #[error("integrity check failed: {reason}")]
    IntegrityFailed {
        /// Which check failed and how.
        reason: String,
    },

    /// A remote operation failed at the transport level.
    #[error("network error: {reason}")]
    Network {
        /// Transport-level failure description.
        reason: String,
    },

    /// A security screen rejected the input before any further processing.
    #[error("security violation: {reason}")]
    SecurityViolation {
        /// What the screen flagged.
        reason: String,
    },

    /// A plugin lifecycle method returned an error.
    #[error("{operation} failed for plugin '{id}': {reason}")]
    Lifecycle {
        /// The lifecycle operation that failed (initialize, start, stop, ...).
        operation: String,
        /// The plugin the operation targeted.
        id: String,
        /// The underlying failure.
        reason: String,
    },

    /// A bounded operation exceeded its deadline.
    #[error("{operation} timed out after {millis} ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        millis: u64,
    },

    /// Registry-store I/O failure.
    #[error("registry store error at {path}: {reason}")]
    Store {
        /// The store location involved.
        path: PathBuf,
        /// The underlying failure.
        reason: String,
    },

    /// Anything the host cannot attribute to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PluginError {
    /// Creates a [`PluginError::NotFound`].
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a [`PluginError::Conflict`].
    pub fn conflict(name: impl Into<String>) -> Self {
        Self::Conflict { name: name.into() }
    }

    /// Creates a [`PluginError::Invalid`].
    pub fn invalid(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::Unauthorized`].
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::IntegrityFailed`].
    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::IntegrityFailed {
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::Network`].
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::SecurityViolation`].
    pub fn security(reason: impl Into<String>) -> Self {
        Self::SecurityViolation {
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::Lifecycle`].
    pub fn lifecycle(
        operation: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Lifecycle {
            operation: operation.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::Timeout`].
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Creates a [`PluginError::Store`].
    pub fn store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`PluginError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the coarse classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::IntegrityFailed { .. } => ErrorKind::IntegrityFailed,
            Self::Network { .. } => ErrorKind::Network,
            Self::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            Self::Lifecycle { .. } => ErrorKind::Lifecycle,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for plugin runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;

//! Plugin lifecycle states and the allowed transitions between them.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an installed plugin.
///
/// ```text
///   install ──► Installing ─ok──► Active ◄──────┐
///                    │              │           │
///                fail│            stop()        │
///                    ▼              ▼           │
///                  Error         Inactive ─start┘
///                                   │
///                               uninstall()
///                                   ▼
///                              Uninstalling ──► (removed)
/// ```
///
/// `Error` is recoverable via start. Transitions are monotonic within one
/// lifecycle: once a plugin is `Uninstalling` it never becomes runnable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Install protocol in progress.
    Installing,
    /// Loaded but not running.
    Inactive,
    /// Running and receiving events.
    Active,
    /// A lifecycle operation failed; start may recover it.
    Error,
    /// Uninstall in progress; terminal.
    Uninstalling,
    /// Host cannot determine the state.
    Unknown,
}

impl LifecycleState {
    /// Whether a transition from `self` to `to` is allowed.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match self {
            Installing => matches!(to, Active | Inactive | Error | Uninstalling),
            Inactive => matches!(to, Active | Error | Uninstalling),
            Active => matches!(to, Inactive | Error | Uninstalling),
            Error => matches!(to, Active | Inactive | Uninstalling),
            Uninstalling => false,
            Unknown => true,
        }
    }

    /// Whether this state means the plugin is currently running.
    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Active => "active",
            LifecycleState::Error => "error",
            LifecycleState::Uninstalling => "uninstalling",
            LifecycleState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

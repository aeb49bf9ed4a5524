//! Capability-based security manager.
//!
//! Tracks which catalog permissions each plugin holds, mints the opaque token
//! a plugin presents on API calls back to the host, and gates endpoint access
//! through a static endpoint → permission table.
//!
//! All operations are total: unknown plugin ids yield `false`/empty rather
//! than errors, and grant silently drops (with a warning) permissions outside
//! the catalog.

pub mod catalog;
pub mod endpoints;
pub mod screening;

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use scribe_core::{PluginError, PluginResult};

pub use catalog::{CATALOG, is_catalog_permission};

/// Number of random bytes in a minted token (128 bits).
const TOKEN_BYTES: usize = 16;

/// The security manager.
///
/// Interior-mutable and cheap to share behind an `Arc`.
#[derive(Default)]
pub struct SecurityManager {
    /// plugin id → granted permissions (always ⊆ catalog).
    grants: RwLock<HashMap<String, HashSet<String>>>,
    /// plugin id → current token.
    tokens: RwLock<HashMap<String, String>>,
}

impl SecurityManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Install gating ──────────────────────────────────────────────────────

    /// Whether a plugin requesting `required` may be installed.
    ///
    /// Returns `false` iff any requested permission is outside the catalog.
    /// Policy hooks (deny-lists) are a future extension.
    pub fn can_install(&self, plugin_id: &str, required: &[String]) -> bool {
        for permission in required {
            if !is_catalog_permission(permission) {
                warn!(
                    plugin = %plugin_id,
                    permission = %permission,
                    "Install refused: permission is not in the catalog"
                );
                return false;
            }
        }
        true
    }

    // ─── Grants ──────────────────────────────────────────────────────────────

    /// Grants `permissions` to `plugin_id`, intersected with the catalog.
    ///
    /// Unknown permissions are dropped with a warning rather than failing the
    /// whole grant.
    pub fn grant(&self, plugin_id: &str, permissions: &[String]) {
        let mut accepted: HashSet<String> = HashSet::new();
        for permission in permissions {
            if is_catalog_permission(permission) {
                accepted.insert(permission.clone());
            } else {
                warn!(
                    plugin = %plugin_id,
                    permission = %permission,
                    "Dropping grant of unknown permission"
                );
            }
        }
        if accepted.is_empty() {
            return;
        }
        debug!(plugin = %plugin_id, granted = accepted.len(), "Granted permissions");
        self.grants
            .write()
            .entry(plugin_id.to_string())
            .or_default()
            .extend(accepted);
    }

    /// Revokes the listed permissions from `plugin_id`.
    pub fn revoke(&self, plugin_id: &str, permissions: &[String]) {
        let mut grants = self.grants.write();
        if let Some(held) = grants.get_mut(plugin_id) {
            for permission in permissions {
                held.remove(permission);
            }
            if held.is_empty() {
                grants.remove(plugin_id);
            }
        }
    }

    /// Revokes every permission held by `plugin_id`.
    pub fn revoke_all(&self, plugin_id: &str) {
        if self.grants.write().remove(plugin_id).is_some() {
            info!(plugin = %plugin_id, "Revoked all permissions");
        }
    }

    /// Whether `plugin_id` currently holds `permission`.
    pub fn has_permission(&self, plugin_id: &str, permission: &str) -> bool {
        self.grants
            .read()
            .get(plugin_id)
            .is_some_and(|held| held.contains(permission))
    }

    /// The permissions currently held by `plugin_id` (empty for unknown ids).
    pub fn granted(&self, plugin_id: &str) -> HashSet<String> {
        self.grants.read().get(plugin_id).cloned().unwrap_or_default()
    }

    // ─── Tokens ──────────────────────────────────────────────────────────────

    /// Mints a fresh 128-bit token for `plugin_id`, replacing any existing
    /// one, and returns it.
    pub fn mint_token(&self, plugin_id: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.tokens
            .write()
            .insert(plugin_id.to_string(), token.clone());
        debug!(plugin = %plugin_id, "Minted plugin token");
        token
    }

    /// Resolves a presented token to its plugin id.
    ///
    /// Comparison is constant-time per stored token so lookup latency does
    /// not leak how much of a candidate matched.
    pub fn lookup_by_token(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.read();
        let mut found = None;
        for (plugin_id, stored) in tokens.iter() {
            if stored.as_bytes().ct_eq(token.as_bytes()).into() {
                found = Some(plugin_id.clone());
            }
        }
        found
    }

    /// Destroys `plugin_id`'s token, if any.
    pub fn destroy_token(&self, plugin_id: &str) {
        self.tokens.write().remove(plugin_id);
    }

    // ─── API-call gating ─────────────────────────────────────────────────────

    /// Whether `plugin_id` may call `endpoint` with `method`.
    ///
    /// Endpoints missing from the static table deny by default; present
    /// endpoints allow iff the plugin holds the mapped permission.
    pub fn authorize_api_call(&self, plugin_id: &str, endpoint: &str, method: &str) -> bool {
        match endpoints::required_permission(endpoint, method) {
            Some(permission) => self.has_permission(plugin_id, permission),
            None => {
                debug!(
                    plugin = %plugin_id,
                    endpoint = %endpoint,
                    method = %method,
                    "Denied call to unmapped endpoint"
                );
                false
            }
        }
    }

    // ─── Remote-bundle hook ──────────────────────────────────────────────────

    /// Static screen for a remotely fetched bundle, run before the bundle is
    /// handed to the local loader. Every artifact's bytes go through the
    /// same denylist/pattern rules the submission validator applies; the
    /// first finding rejects the bundle with a SecurityViolation.
    pub fn screen_remote_bundle<I>(&self, url: &str, artifacts: I) -> PluginResult<()>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        for (artifact, bytes) in artifacts {
            if let Some(finding) = screening::screen_artifact(&bytes).into_iter().next() {
                warn!(
                    url = %url,
                    artifact = %artifact,
                    finding = %finding,
                    "Remote bundle failed static screen"
                );
                return Err(PluginError::security(format!(
                    "remote bundle artifact '{artifact}' {finding}"
                )));
            }
        }
        debug!(url = %url, "Remote bundle passed static screen");
        Ok(())
    }
}

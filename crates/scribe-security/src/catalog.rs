//! The fixed permission catalog.
//!
//! A permission is a `resource.action` string authorizing a plugin to invoke
//! host APIs tagged with it. Strings outside this catalog are invalid
//! everywhere in the runtime; there is no way for a plugin to declare new
//! ones.

/// Read notes.
pub const NOTES_READ: &str = "notes.read";
/// Create or update notes.
pub const NOTES_WRITE: &str = "notes.write";
/// Delete notes.
pub const NOTES_DELETE: &str = "notes.delete";
/// Read user profiles.
pub const USERS_READ: &str = "users.read";
/// Publish events onto the bus.
pub const EVENTS_PUBLISH: &str = "system.events.publish";
/// Subscribe to bus events.
pub const EVENTS_SUBSCRIBE: &str = "system.events.subscribe";
/// Read blockchain-anchored state.
pub const BLOCKCHAIN_READ: &str = "blockchain.read";
/// Administer the plugin runtime itself.
pub const ADMIN_PLUGINS: &str = "admin.plugins";

/// Every permission the runtime recognizes.
pub const CATALOG: &[&str] = &[
    NOTES_READ,
    NOTES_WRITE,
    NOTES_DELETE,
    USERS_READ,
    EVENTS_PUBLISH,
    EVENTS_SUBSCRIBE,
    BLOCKCHAIN_READ,
    ADMIN_PLUGINS,
];

/// Whether `permission` is in the catalog.
pub fn is_catalog_permission(permission: &str) -> bool {
    CATALOG.contains(&permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_membership() {
        assert!(is_catalog_permission("notes.write"));
        assert!(!is_catalog_permission("notes.teleport"));
        assert!(!is_catalog_permission(""));
    }
}

//! Static endpoint → permission table for plugin API calls.

use crate::catalog;

/// (path, method) pairs mapped to the permission required to call them.
///
/// Endpoints absent from this table deny by default.
pub const ENDPOINT_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("/api/notes", "GET", catalog::NOTES_READ),
    ("/api/notes", "POST", catalog::NOTES_WRITE),
    ("/api/notes", "PUT", catalog::NOTES_WRITE),
    ("/api/notes", "DELETE", catalog::NOTES_DELETE),
    ("/api/tags", "GET", catalog::NOTES_READ),
    ("/api/tags", "POST", catalog::NOTES_WRITE),
    ("/api/users", "GET", catalog::USERS_READ),
    ("/api/events/publish", "POST", catalog::EVENTS_PUBLISH),
    ("/api/events/subscribe", "POST", catalog::EVENTS_SUBSCRIBE),
    ("/api/blockchain/anchors", "GET", catalog::BLOCKCHAIN_READ),
    ("/api/admin/plugins", "GET", catalog::ADMIN_PLUGINS),
    ("/api/admin/plugins", "POST", catalog::ADMIN_PLUGINS),
    ("/api/admin/plugins", "DELETE", catalog::ADMIN_PLUGINS),
];

/// Permission required for `(endpoint, method)`, or `None` when the endpoint
/// is not in the table (deny by default).
pub fn required_permission(endpoint: &str, method: &str) -> Option<&'static str> {
    ENDPOINT_PERMISSIONS
        .iter()
        .find(|(path, m, _)| *path == endpoint && m.eq_ignore_ascii_case(method))
        .map(|(_, _, permission)| *permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_method_insensitive() {
        assert_eq!(required_permission("/api/notes", "get"), Some("notes.read"));
        assert_eq!(
            required_permission("/api/notes", "DELETE"),
            Some("notes.delete")
        );
    }

    #[test]
    fn unknown_endpoints_have_no_permission() {
        assert_eq!(required_permission("/api/unknown", "GET"), None);
    }
}

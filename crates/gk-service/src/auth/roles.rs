//! Role-based authorization gate.
//!
//! Runs after token validation; never re-verifies the token.

use crate::auth::identity::UserContext;
use crate::errors::AuthError;
use crate::observability::metrics::record_role_check;

/// Require `role` on an already-validated identity.
///
/// Returns the identity unchanged when the role is present.
///
/// # Errors
///
/// Returns `AuthError::Forbidden` when the identity does not hold `role`.
pub fn require_role(identity: UserContext, role: &str) -> Result<UserContext, AuthError> {
    if identity.has_role(role) {
        record_role_check("granted");
        return Ok(identity);
    }

    tracing::warn!(
        target: "gk.auth.roles",
        oid = %identity.oid,
        required_role = %role,
        role_count = identity.roles.len(),
        "Access denied: required role missing"
    );
    record_role_check("denied");
    Err(AuthError::Forbidden)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn identity(roles: &[&str]) -> UserContext {
        UserContext {
            email: "alice@contoso.com".to_string(),
            name: "Alice".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
            oid: "abc".to_string(),
        }
    }

    #[test]
    fn test_role_present_returns_identity_unchanged() {
        let original = identity(&["IT.Admin", "IT.Agent"]);

        let result = require_role(original.clone(), "IT.Admin").unwrap();
        assert_eq!(result, original);
    }

    #[test]
    fn test_role_missing_is_forbidden() {
        let result = require_role(identity(&["IT.Agent"]), "IT.Admin");
        assert_eq!(result, Err(AuthError::Forbidden));
    }

    #[test]
    fn test_empty_roles_is_forbidden() {
        let result = require_role(identity(&[]), "IT.Admin");
        assert_eq!(result, Err(AuthError::Forbidden));
    }

    #[test]
    fn test_role_match_is_case_sensitive() {
        let result = require_role(identity(&["it.admin"]), "IT.Admin");
        assert_eq!(result, Err(AuthError::Forbidden));
    }
}

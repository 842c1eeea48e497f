//! Normalized caller identity derived from verified claims.

use crate::auth::claims::VerifiedClaims;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Identity of an authenticated caller, handed to every protected handler.
///
/// Immutable once built; lives for a single request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub email: String,
    pub name: String,
    pub roles: BTreeSet<String>,
    pub oid: String,
}

impl UserContext {
    /// Check whether the caller holds `role` (exact, case-sensitive match).
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Custom Debug implementation that redacts `email` and `name`.
impl fmt::Debug for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserContext")
            .field("email", &"[REDACTED]")
            .field("name", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("oid", &self.oid)
            .finish()
    }
}

/// Build a [`UserContext`] from verified claims.
///
/// The email is the first non-empty value among `preferred_username`,
/// `email` and `upn`. Returns `None` when none of them is present, since a
/// token without a usable identity must not be trusted.
pub fn extract_identity(claims: &VerifiedClaims) -> Option<UserContext> {
    let email = [&claims.preferred_username, &claims.email, &claims.upn]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())?
        .clone();

    Some(UserContext {
        email,
        name: claims.name.clone().unwrap_or_default(),
        roles: claims
            .roles
            .as_ref()
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default(),
        oid: claims.oid.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn claims(json: serde_json::Value) -> VerifiedClaims {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_preferred_username_wins() {
        let identity = extract_identity(&claims(serde_json::json!({
            "preferred_username": "alice@contoso.com",
            "email": "alice.mail@contoso.com",
            "upn": "alice.upn@contoso.com"
        })))
        .unwrap();

        assert_eq!(identity.email, "alice@contoso.com");
    }

    #[test]
    fn test_falls_back_to_email_then_upn() {
        let from_email = extract_identity(&claims(serde_json::json!({
            "email": "bob@contoso.com",
            "upn": "bob.upn@contoso.com"
        })))
        .unwrap();
        assert_eq!(from_email.email, "bob@contoso.com");

        let from_upn = extract_identity(&claims(serde_json::json!({
            "upn": "carol@contoso.com"
        })))
        .unwrap();
        assert_eq!(from_upn.email, "carol@contoso.com");
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let identity = extract_identity(&claims(serde_json::json!({
            "preferred_username": "",
            "upn": "dave@contoso.com"
        })))
        .unwrap();

        assert_eq!(identity.email, "dave@contoso.com");
    }

    #[test]
    fn test_no_email_like_claim_yields_none() {
        let result = extract_identity(&claims(serde_json::json!({
            "oid": "abc",
            "name": "Nobody",
            "roles": ["IT.Admin"]
        })));

        assert!(result.is_none());
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        let identity = extract_identity(&claims(serde_json::json!({
            "email": "erin@contoso.com"
        })))
        .unwrap();

        assert_eq!(identity.name, "");
        assert_eq!(identity.oid, "");
        assert!(identity.roles.is_empty());
    }

    #[test]
    fn test_fields_copied_verbatim() {
        let identity = extract_identity(&claims(serde_json::json!({
            "preferred_username": "frank@contoso.com",
            "name": "Frank Example",
            "oid": "abc",
            "roles": ["IT.Agent", "IT.Admin", "IT.Admin"]
        })))
        .unwrap();

        assert_eq!(identity.name, "Frank Example");
        assert_eq!(identity.oid, "abc");
        assert_eq!(
            identity.roles,
            BTreeSet::from(["IT.Admin".to_string(), "IT.Agent".to_string()])
        );
        assert!(identity.has_role("IT.Admin"));
        assert!(!identity.has_role("it.admin"));
    }

    #[test]
    fn test_debug_redacts_email_and_name() {
        let identity = extract_identity(&claims(serde_json::json!({
            "email": "grace@contoso.com",
            "name": "Grace Example"
        })))
        .unwrap();

        let debug_str = format!("{:?}", identity);
        assert!(!debug_str.contains("grace@contoso.com"));
        assert!(!debug_str.contains("Grace Example"));
    }

    #[test]
    fn test_serializes_roles_as_list() {
        let identity = UserContext {
            email: "heidi@contoso.com".to_string(),
            name: "Heidi".to_string(),
            roles: BTreeSet::from(["IT.Admin".to_string()]),
            oid: "abc".to_string(),
        };

        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["roles"], serde_json::json!(["IT.Admin"]));
        assert_eq!(json["oid"], "abc");
    }
}

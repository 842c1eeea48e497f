//! Verified JWT claims.
//!
//! Contains the claims extracted from tokens whose signature and standard
//! claims have already been checked. Personal data (`sub`, `oid`, email-like
//! claims, `name`) is redacted in Debug output to prevent exposure in logs.
//!
//! Every field is optional at the type level so that a missing `exp`, `iss`
//! or `aud` is reported by the validator as a missing required claim rather
//! than as a deserialization failure.

use serde::Deserialize;
use std::fmt;

/// The `aud` claim, which the provider may send as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// All audience values carried by the claim.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Audience::Single(aud) => vec![aud.as_str()],
            Audience::Multiple(auds) => auds.iter().map(String::as_str).collect(),
        }
    }
}

/// Claims of a verified access token.
#[derive(Clone, Default, Deserialize)]
pub struct VerifiedClaims {
    /// Subject - redacted in Debug output.
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default)]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub aud: Option<Audience>,

    /// Directory object id of the user - redacted in Debug output.
    #[serde(default)]
    pub oid: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// User principal name (legacy v1 tokens).
    #[serde(default)]
    pub upn: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// App roles assigned to the caller.
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// Custom Debug implementation that redacts personal data.
impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("oid", &"[REDACTED]")
            .field("preferred_username", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("upn", &"[REDACTED]")
            .field("name", &"[REDACTED]")
            .field("roles", &self.roles)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_debug_redacts_personal_data() {
        let claims: VerifiedClaims = serde_json::from_value(serde_json::json!({
            "sub": "secret-subject",
            "oid": "secret-oid",
            "preferred_username": "alice@contoso.com",
            "name": "Alice Example",
            "roles": ["IT.Admin"]
        }))
        .unwrap();

        let debug_str = format!("{:?}", claims);

        assert!(!debug_str.contains("secret-subject"));
        assert!(!debug_str.contains("secret-oid"));
        assert!(!debug_str.contains("alice@contoso.com"));
        assert!(!debug_str.contains("Alice Example"));
        assert!(debug_str.contains("IT.Admin"));
    }

    #[test]
    fn test_audience_accepts_string_and_array() {
        let single: VerifiedClaims =
            serde_json::from_value(serde_json::json!({"aud": "api://app"})).unwrap();
        assert_eq!(single.aud.unwrap().values(), vec!["api://app"]);

        let multiple: VerifiedClaims =
            serde_json::from_value(serde_json::json!({"aud": ["a", "b"]})).unwrap();
        assert_eq!(multiple.aud.unwrap().values(), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_claims_deserialize_as_none() {
        let claims: VerifiedClaims = serde_json::from_value(serde_json::json!({})).unwrap();

        assert!(claims.exp.is_none());
        assert!(claims.iss.is_none());
        assert!(claims.aud.is_none());
        assert!(claims.roles.is_none());
    }

    #[test]
    fn test_roles_must_be_a_list() {
        let result: Result<VerifiedClaims, _> =
            serde_json::from_value(serde_json::json!({"roles": "IT.Admin"}));
        assert!(result.is_err());
    }
}

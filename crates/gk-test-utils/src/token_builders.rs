//! Builder patterns for test token claims
//!
//! Provides a fluent API for provider-shaped access token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Tenant ID used by every test configuration.
pub const TEST_TENANT_ID: &str = "test-tenant";

/// Client ID used by every test configuration.
pub const TEST_CLIENT_ID: &str = "test-client";

/// v2.0 issuer for [`TEST_TENANT_ID`].
pub const TEST_ISSUER: &str = "https://login.microsoftonline.com/test-tenant/v2.0";

/// v1.0 issuer for [`TEST_TENANT_ID`].
pub const TEST_ISSUER_V1: &str = "https://sts.windows.net/test-tenant/";

/// Default audience (`api://` form of [`TEST_CLIENT_ID`]).
pub const TEST_AUDIENCE: &str = "api://test-client";

/// Default directory object ID of the test user.
pub const TEST_OID: &str = "00000000-0000-0000-0000-000000000001";

/// Default username of the test user.
pub const TEST_USERNAME: &str = "alice@contoso.com";

/// Builder for access token claims
///
/// Defaults produce a token the test configuration accepts: trusted issuer,
/// accepted audience, valid for an hour, with a username and no roles.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .with_roles(&["IT.Admin"])
///     .expires_in(600)
///     .build();
/// let token = TestRsaKey::primary().sign(&claims)?;
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("oid".to_string(), json!(TEST_OID));
        claims.insert("preferred_username".to_string(), json!(TEST_USERNAME));
        claims.insert("name".to_string(), json!("Alice Example"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert("nbf".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the app roles
    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.with_claim("roles", json!(roles))
    }

    /// Set the issuer
    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set the audience (a string or an array)
    pub fn with_audience(self, audience: Value) -> Self {
        self.with_claim("aud", audience)
    }

    /// Set the username claim
    pub fn with_username(self, username: &str) -> Self {
        self.with_claim("preferred_username", json!(username))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.with_claim("nbf", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set or replace any claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

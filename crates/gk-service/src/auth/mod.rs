//! Authentication and authorization for Gatekeeper.
//!
//! Validates identity-provider access tokens against the provider's published
//! signing keys and gates routes on app roles.
//!
//! # Components
//!
//! - `jwks` - Signing key cache (fetch, TTL, single-flight refresh, stale fallback)
//! - `jwt` - Token validation with one forced key refresh on signature mismatch
//! - `claims` - Claims of a verified token
//! - `identity` - Normalized caller identity built from claims
//! - `roles` - Role-based authorization gate

pub mod claims;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod roles;

pub use claims::VerifiedClaims;
pub use identity::{extract_identity, UserContext};
pub use jwks::JwksClient;
pub use jwt::JwtValidator;
pub use roles::require_role;

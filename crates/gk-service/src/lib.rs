//! Gatekeeper Service Library
//!
//! Bearer token authentication for internal HTTP APIs fronted by an
//! OpenID Connect identity provider:
//!
//! - Validates RS256 access tokens against the provider's published keys
//! - Caches signing keys with reactive refresh and rotation handling
//! - Normalizes claims into a caller identity
//! - Gates route groups on app roles
//!
//! # Modules
//!
//! - `auth` - Key cache, token validation, identity and role checks
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth and metrics middleware
//! - `observability` - Metrics definitions
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;

//! Middleware for Gatekeeper.
//!
//! # Components
//!
//! - `auth` - Token validation and role gating for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, require_role, AuthState, RoleState};
pub use http_metrics::http_metrics_middleware;

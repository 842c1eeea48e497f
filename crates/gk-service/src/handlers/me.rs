//! Current user handlers.
//!
//! Return the identity the auth middleware attached to the request.

use crate::auth::UserContext;
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /api/v1/me
///
/// ## Response
///
/// ```json
/// {
///   "email": "alice@contoso.com",
///   "name": "Alice Example",
///   "roles": ["IT.Admin"],
///   "oid": "00000000-0000-0000-0000-000000000001"
/// }
/// ```
#[instrument(skip_all, name = "gk.handlers.me")]
pub async fn get_me(Extension(identity): Extension<UserContext>) -> Json<UserContext> {
    tracing::debug!(target: "gk.handlers.me", oid = %identity.oid, "Returning caller identity");
    Json(identity)
}

/// Handler for GET /api/v1/admin/me
///
/// Same body as `/api/v1/me`; only reachable with the admin role.
#[instrument(skip_all, name = "gk.handlers.admin_me")]
pub async fn get_admin_me(Extension(identity): Extension<UserContext>) -> Json<UserContext> {
    tracing::debug!(target: "gk.handlers.me", oid = %identity.oid, "Returning admin identity");
    Json(identity)
}

//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks that signing keys can be served

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// "available" or "unavailable".
    pub signing_keys: &'static str,
}

/// Liveness probe handler.
///
/// Does NOT check any dependencies - failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Ready while token lookups could be served. An empty or expired key set
/// triggers a fetch (joining any fetch already in flight), so the first
/// probe also warms the cache. Returns 503 while no keys can be obtained,
/// including once retained keys pass the staleness bound.
#[tracing::instrument(skip_all, name = "gk.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.jwks_client.has_servable_keys().await;

    if ready {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                signing_keys: "available",
            }),
        )
    } else {
        tracing::warn!(target: "gk.availability", "Readiness check failed: signing keys unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                signing_keys: "unavailable",
            }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[test]
    fn test_readiness_response_serialization() {
        let json = serde_json::to_string(&ReadinessResponse {
            status: "not_ready",
            signing_keys: "unavailable",
        })
        .unwrap();

        assert!(json.contains("\"status\":\"not_ready\""));
        assert!(json.contains("\"signing_keys\":\"unavailable\""));
    }

    // readiness_check needs a key cache and is covered by the integration tests.
}

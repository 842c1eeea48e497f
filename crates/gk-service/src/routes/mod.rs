//! HTTP routes for Gatekeeper.
//!
//! Defines the Axum router and application state.

use crate::auth::{JwksClient, JwtValidator};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    http_metrics_middleware, require_auth, require_role, AuthState, RoleState,
};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Process-wide signing key cache.
    pub jwks_client: Arc<JwksClient>,

    /// Token validator sharing `jwks_client`.
    pub jwt_validator: Arc<JwtValidator>,
}

impl AppState {
    /// Build state with an HTTP-backed key cache for `config.jwks_url`.
    pub fn from_config(config: Config) -> Self {
        let jwks_client = Arc::new(
            JwksClient::with_ttl(config.jwks_url.clone(), config.jwks_cache_ttl)
                .with_max_staleness(config.jwks_max_staleness),
        );
        Self::with_jwks_client(config, jwks_client)
    }

    /// Build state around an existing key cache.
    pub fn with_jwks_client(config: Config, jwks_client: Arc<JwksClient>) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(
            Arc::clone(&jwks_client),
            &config.trusted_issuers,
            &config.accepted_audiences,
            config.jwt_clock_skew,
        ));

        Self {
            config,
            jwks_client,
            jwt_validator,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public, unversioned
/// - `/ready` - Readiness probe (signing keys available) - public, unversioned
/// - `/metrics` - Prometheus metrics endpoint - public, unversioned
/// - `/api/v1/me` - Current user endpoint - requires authentication
/// - `/api/v1/admin/me` - Current user endpoint - requires the admin role
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        jwt_validator: Arc::clone(&state.jwt_validator),
    });
    let admin_state = Arc::new(RoleState {
        required_role: state.config.admin_role.clone(),
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Authenticated routes
    let protected_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&auth_state),
            require_auth,
        ));

    // Admin routes: the role layer runs inside the auth layer
    let admin_routes = Router::new()
        .route("/api/v1/admin/me", get(handlers::get_admin_me))
        .route_layer(middleware::from_fn_with_state(admin_state, require_role))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

//! Test server harness for E2E testing
//!
//! Provides `TestGkServer` for spawning real Gatekeeper server instances in tests.

use crate::token_builders::{TEST_CLIENT_ID, TEST_TENANT_ID};
use gk_service::config::Config;
use gk_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning a Gatekeeper server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_me_flow() -> Result<()> {
///     let jwks = MockJwksServer::start(&[&TestRsaKey::primary()]).await?;
///     let server = TestGkServer::spawn(&jwks.jwks_url()).await?;
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/v1/me", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGkServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGkServer {
    /// Spawn a server that fetches signing keys from `jwks_url`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use the test tenant and client IDs
    /// - Start the HTTP server in the background
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(jwks_url, HashMap::new()).await
    }

    /// Spawn a server with extra environment overrides (e.g. `ADMIN_ROLE`).
    pub async fn spawn_with_vars(
        jwks_url: &str,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("AZURE_TENANT_ID".to_string(), TEST_TENANT_ID.to_string()),
            ("AZURE_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("JWKS_URL".to_string(), jwks_url.to_string()),
            ("GK_DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::from_config(config));

        // A recorder that is never installed globally, so every test server
        // gets its own handle without conflicting with other tests
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Get the server's application state (key cache, validator).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestGkServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

//! Mock identity provider JWKS endpoint
//!
//! Wraps a `wiremock::MockServer` serving the provider's key set, with
//! helpers to rotate keys, simulate outages and count fetches.

use crate::crypto_fixtures::{jwks_document, FixtureError, TestRsaKey};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the provider serves its key set on.
pub const JWKS_PATH: &str = "/test-tenant/discovery/v2.0/keys";

/// Mock JWKS endpoint.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::start(&[&TestRsaKey::primary()]).await?;
/// let server = TestGkServer::spawn(&jwks.jwks_url()).await?;
///
/// jwks.serve_keys(&[&TestRsaKey::primary(), &TestRsaKey::rotated()]).await?;
/// assert_eq!(jwks.fetch_count().await, 1);
/// ```
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server publishing `keys`.
    pub async fn start(keys: &[&TestRsaKey]) -> Result<Self, FixtureError> {
        let jwks = Self {
            server: MockServer::start().await,
        };
        jwks.serve_keys(keys).await?;
        Ok(jwks)
    }

    /// Start a server whose key endpoint answers with `status`.
    pub async fn start_failing(status: u16) -> Self {
        let jwks = Self {
            server: MockServer::start().await,
        };
        jwks.fail_with(status).await;
        jwks
    }

    /// Full URL of the key endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace the published key set. Also clears the fetch count.
    pub async fn serve_keys(&self, keys: &[&TestRsaKey]) -> Result<(), FixtureError> {
        let body = jwks_document(keys)?;
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
        Ok(())
    }

    /// Make the key endpoint fail. Also clears the fetch count.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of key set fetches since the last `serve_keys`/`fail_with`.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_PATH)
                    .count()
            })
    }
}

//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for the Gatekeeper service.
//!
//! This crate provides:
//! - Fixed RSA signing keys and JWK rendering (`TestRsaKey`)
//! - Provider-shaped token claims (`TestTokenBuilder`)
//! - Mock JWKS endpoint (`MockJwksServer`)
//! - Server test harness (`TestGkServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gk_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestRsaKey::primary();
//!     let jwks = MockJwksServer::start(&[&key]).await?;
//!     let server = TestGkServer::spawn(&jwks.jwks_url()).await?;
//!
//!     let token = key.sign(&TestTokenBuilder::new().build())?;
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use server_harness::*;
pub use token_builders::*;

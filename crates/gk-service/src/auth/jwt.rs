//! Access token validation.
//!
//! Validates incoming provider-issued JWTs using public keys from the JWKS
//! key cache and turns them into a [`UserContext`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; the declared `alg` is checked before any key
//!   lookup, so `none` and HMAC tokens never reach verification
//! - `exp`, `iss` and `aud` are required; `nbf` is honored when present
//! - A signature mismatch triggers exactly one forced key refresh, which
//!   absorbs provider key rotation; claim failures never trigger a refresh
//! - Generic error messages prevent information leakage

use crate::auth::claims::{Audience, VerifiedClaims};
use crate::auth::identity::{extract_identity, UserContext};
use crate::auth::jwks::{JwksClient, KeyCacheError};
use crate::errors::AuthError;
use crate::observability::metrics::record_token_validation;
use common::jwt::{extract_header, MAX_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// The only accepted signing algorithm, as written in the JWT header.
const ACCEPTED_ALG: &str = "RS256";

/// Verification attempts per token: the cached key, then one forced refresh.
const MAX_VERIFY_ATTEMPTS: u32 = 2;

/// Result of verifying a token against one key.
#[derive(Debug)]
enum AttemptOutcome {
    /// Signature and claims verified.
    Verified(Box<VerifiedClaims>),

    /// The key did not verify the signature; a refreshed key might.
    SignatureMismatch,

    /// The token is rejected regardless of which key is used.
    Rejected(AuthError),
}

/// Token validator backed by the shared JWKS key cache.
pub struct JwtValidator {
    /// Key cache for fetching provider signing keys.
    jwks_client: Arc<JwksClient>,

    /// Claim rules applied by `jsonwebtoken` (algorithm, issuers, audiences, leeway).
    validation: Validation,

    /// Signature-only rules, used to read the presented claims for rejection logs.
    signature_only: Validation,
}

impl JwtValidator {
    /// Create a new validator.
    ///
    /// # Arguments
    ///
    /// * `jwks_client` - Shared signing key cache
    /// * `trusted_issuers` - Accepted `iss` values
    /// * `accepted_audiences` - Accepted `aud` values; one match is enough
    /// * `clock_skew` - Leeway for `exp`/`nbf`, capped at [`MAX_CLOCK_SKEW`]
    pub fn new(
        jwks_client: Arc<JwksClient>,
        trusted_issuers: &[String],
        accepted_audiences: &[String],
        clock_skew: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(trusted_issuers);
        validation.set_audience(accepted_audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = clock_skew.min(MAX_CLOCK_SKEW).as_secs();

        let mut signature_only = Validation::new(Algorithm::RS256);
        signature_only.required_spec_claims.clear();
        signature_only.validate_exp = false;
        signature_only.validate_nbf = false;
        signature_only.validate_aud = false;

        Self {
            jwks_client,
            validation,
            signature_only,
        }
    }

    /// Validate an access token and return the caller's identity.
    ///
    /// # Security Checks
    ///
    /// 1. Size and structure check of the unverified header
    /// 2. `alg` must be exactly RS256
    /// 3. Fetch the signing key for `kid` from the key cache
    /// 4. Verify the RS256 signature, retrying once with a forced key refresh
    /// 5. Validate `exp`, `nbf`, `iss` and `aud`
    /// 6. Extract a usable identity
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` describing the first failed check. All token
    /// failures render identically to the client.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<UserContext, AuthError> {
        let result = self.validate_token(token).await;

        match &result {
            Ok(_) => record_token_validation("success"),
            Err(e) => record_token_validation(e.kind()),
        }

        result
    }

    async fn validate_token(&self, token: &str) -> Result<UserContext, AuthError> {
        // 1. Read kid and alg from the unverified header (includes size check)
        let header = extract_header(token).map_err(|e| {
            tracing::debug!(target: "gk.auth.jwt", error = ?e, "Token header extraction failed");
            AuthError::Malformed
        })?;
        let kid = header.kid.as_str();

        // 2. Pin the algorithm before touching any key
        if header.alg.as_deref() != Some(ACCEPTED_ALG) {
            tracing::warn!(
                target: "gk.auth.jwt",
                kid = %kid,
                alg = ?header.alg,
                "Token rejected: unsupported algorithm"
            );
            return Err(AuthError::UnsupportedAlgorithm);
        }

        // 3-5. Verify, with one forced key refresh on signature mismatch
        let mut attempt = 1;
        let claims = loop {
            let force_refresh = attempt > 1;
            let key = self
                .jwks_client
                .get_signing_key(kid, force_refresh)
                .await
                .map_err(|e| map_key_cache_error(e, kid))?;

            match self.verify_attempt(token, &key, kid) {
                AttemptOutcome::Verified(claims) => break claims,
                AttemptOutcome::Rejected(err) => return Err(err),
                AttemptOutcome::SignatureMismatch if attempt < MAX_VERIFY_ATTEMPTS => {
                    tracing::debug!(
                        target: "gk.auth.jwt",
                        kid = %kid,
                        "Signature mismatch, retrying with refreshed signing keys"
                    );
                    attempt += 1;
                }
                AttemptOutcome::SignatureMismatch => {
                    tracing::warn!(
                        target: "gk.auth.jwt",
                        kid = %kid,
                        "Token rejected: signature verification failed after key refresh"
                    );
                    return Err(AuthError::InvalidToken);
                }
            }
        };

        // 6. Identity
        let identity = extract_identity(&claims).ok_or_else(|| {
            tracing::warn!(
                target: "gk.auth.jwt",
                kid = %kid,
                iss = ?claims.iss,
                "Token rejected: no usable identity claim"
            );
            AuthError::MissingIdentity
        })?;

        tracing::debug!(
            target: "gk.auth.jwt",
            kid = %kid,
            iss = ?claims.iss,
            role_count = identity.roles.len(),
            "Token validated successfully"
        );
        Ok(identity)
    }
}

fn map_key_cache_error(err: KeyCacheError, kid: &str) -> AuthError {
    match err {
        KeyCacheError::KeyNotFound => {
            tracing::warn!(target: "gk.auth.jwt", kid = %kid, "Token rejected: unknown signing key");
            AuthError::InvalidToken
        }
        KeyCacheError::FetchFailed => {
            tracing::error!(target: "gk.auth.jwt", kid = %kid, "Signing keys unavailable");
            AuthError::ServiceUnavailable
        }
    }
}

impl JwtValidator {
    /// Verify signature and claims against a single key.
    fn verify_attempt(&self, token: &str, key: &DecodingKey, kid: &str) -> AttemptOutcome {
        let err = match decode::<VerifiedClaims>(token, key, &self.validation) {
            Ok(data) => return AttemptOutcome::Verified(Box::new(data.claims)),
            Err(err) => err,
        };

        let outcome = match err.kind() {
            ErrorKind::InvalidSignature => return AttemptOutcome::SignatureMismatch,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
            _ => AuthError::InvalidToken,
        };

        // Claim checks run after the signature check, so these values are authentic
        let presented = match outcome {
            AuthError::Expired | AuthError::InvalidAudience | AuthError::InvalidIssuer => {
                self.presented_claims(token, key)
            }
            _ => None,
        };
        let iss = presented.as_ref().and_then(|claims| claims.iss.as_deref());
        let aud = presented
            .as_ref()
            .and_then(|claims| claims.aud.as_ref())
            .map(Audience::values);

        tracing::warn!(
            target: "gk.auth.jwt",
            kid = %kid,
            iss = ?iss,
            aud = ?aud,
            error = %err,
            outcome = outcome.kind(),
            "Token rejected"
        );
        AttemptOutcome::Rejected(outcome)
    }

    /// Claims of a correctly signed token, without any claim checks.
    fn presented_claims(&self, token: &str, key: &DecodingKey) -> Option<VerifiedClaims> {
        decode::<VerifiedClaims>(token, key, &self.signature_only)
            .ok()
            .map(|data| data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::{JwksFetchError, JwksFetcher, JwksResponse, DEFAULT_CACHE_TTL};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher that must never be reached.
    struct UnreachableFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JwksFetcher for UnreachableFetcher {
        async fn fetch(&self) -> Result<JwksResponse, JwksFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(JwksFetchError::Transport("unreachable".to_string()))
        }
    }

    fn validator() -> (JwtValidator, Arc<UnreachableFetcher>) {
        let fetcher = Arc::new(UnreachableFetcher {
            calls: AtomicUsize::new(0),
        });
        let jwks_client = Arc::new(JwksClient::with_fetcher(
            Arc::clone(&fetcher) as Arc<dyn JwksFetcher>,
            DEFAULT_CACHE_TTL,
        ));
        let validator = JwtValidator::new(
            jwks_client,
            &["https://issuer.example/v2.0".to_string()],
            &["api://app".to_string()],
            Duration::ZERO,
        );
        (validator, fetcher)
    }

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header.as_bytes());
        let payload_b64 = URL_SAFE_NO_PAD.encode(br#"{"sub":"x","exp":9999999999}"#);
        format!("{}.{}.c2lnbmF0dXJl", header_b64, payload_b64)
    }

    #[tokio::test]
    async fn test_malformed_tokens_rejected_without_fetch() {
        let (validator, fetcher) = validator();

        for token in ["", "single", "only.two", "a.b.c.d", "!!!.payload.sig"] {
            assert_eq!(
                validator.validate(token).await,
                Err(AuthError::Malformed),
                "token: {token:?}"
            );
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let (validator, _) = validator();
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);

        assert_eq!(validator.validate(&token).await, Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn test_oversized_token_is_malformed() {
        let (validator, _) = validator();
        let token = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(validator.validate(&token).await, Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn test_non_rs256_algorithms_rejected_without_fetch() {
        let (validator, fetcher) = validator();

        for header in [
            r#"{"alg":"HS256","kid":"k1"}"#,
            r#"{"alg":"none","kid":"k1"}"#,
            r#"{"alg":"RS512","kid":"k1"}"#,
            r#"{"alg":"EdDSA","kid":"k1"}"#,
            r#"{"alg":"rs256","kid":"k1"}"#,
            r#"{"kid":"k1"}"#,
        ] {
            let token = token_with_header(header);
            assert_eq!(
                validator.validate(&token).await,
                Err(AuthError::UnsupportedAlgorithm),
                "header: {header}"
            );
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cold_cache_outage_is_service_unavailable() {
        let (validator, _) = validator();
        let token = token_with_header(r#"{"alg":"RS256","kid":"k1"}"#);

        assert_eq!(
            validator.validate(&token).await,
            Err(AuthError::ServiceUnavailable)
        );
    }

    #[test]
    fn test_clock_skew_is_capped() {
        let (_, fetcher) = validator();
        let jwks_client = Arc::new(JwksClient::with_fetcher(
            fetcher as Arc<dyn JwksFetcher>,
            DEFAULT_CACHE_TTL,
        ));

        let validator = JwtValidator::new(
            jwks_client,
            &["iss".to_string()],
            &["aud".to_string()],
            Duration::from_secs(3600),
        );

        assert_eq!(validator.validation.leeway, MAX_CLOCK_SKEW.as_secs());
    }

    #[test]
    fn test_validation_requires_exp_iss_aud() {
        let (validator, _) = validator();

        for claim in ["exp", "iss", "aud"] {
            assert!(validator.validation.required_spec_claims.contains(claim));
        }
        assert_eq!(validator.validation.algorithms, vec![Algorithm::RS256]);
        assert!(validator.validation.validate_nbf);
    }

    #[test]
    fn test_map_key_cache_error() {
        assert_eq!(
            map_key_cache_error(KeyCacheError::KeyNotFound, "k1"),
            AuthError::InvalidToken
        );
        assert_eq!(
            map_key_cache_error(KeyCacheError::FetchFailed, "k1"),
            AuthError::ServiceUnavailable
        );
    }

    // =========================================================================
    // Rejection logging
    // =========================================================================

    /// Serves a fixed key set.
    struct StaticFetcher(serde_json::Value);

    #[async_trait]
    impl JwksFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<JwksResponse, JwksFetchError> {
            serde_json::from_value(self.0.clone()).map_err(|e| JwksFetchError::Parse(e.to_string()))
        }
    }

    /// Collects formatted log output for the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn signed_validator() -> JwtValidator {
        let key = gk_test_utils::TestRsaKey::primary();
        let document = gk_test_utils::jwks_document(&[&key]).unwrap();
        let jwks_client = Arc::new(JwksClient::with_fetcher(
            Arc::new(StaticFetcher(document)),
            DEFAULT_CACHE_TTL,
        ));
        JwtValidator::new(
            jwks_client,
            &[gk_test_utils::TEST_ISSUER.to_string()],
            &[gk_test_utils::TEST_AUDIENCE.to_string()],
            Duration::ZERO,
        )
    }

    async fn validate_with_logs(claims: serde_json::Value) -> (Result<UserContext, AuthError>, String) {
        let token = gk_test_utils::TestRsaKey::primary().sign(&claims).unwrap();
        let validator = signed_validator();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let result = validator.validate(&token).await;
        (result, logs.contents())
    }

    #[tokio::test]
    async fn test_audience_rejection_logs_presented_claims() {
        let claims = gk_test_utils::TestTokenBuilder::new()
            .with_audience(serde_json::json!("api://someone-else"))
            .build();

        let (result, logs) = validate_with_logs(claims).await;

        assert_eq!(result, Err(AuthError::InvalidAudience));
        assert!(logs.contains("api://someone-else"), "{logs}");
        assert!(logs.contains(gk_test_utils::TEST_ISSUER), "{logs}");
        assert!(logs.contains(gk_test_utils::PRIMARY_KID), "{logs}");
    }

    #[tokio::test]
    async fn test_issuer_rejection_logs_presented_claims() {
        let claims = gk_test_utils::TestTokenBuilder::new()
            .with_issuer("https://evil.example/v2.0")
            .build();

        let (result, logs) = validate_with_logs(claims).await;

        assert_eq!(result, Err(AuthError::InvalidIssuer));
        assert!(logs.contains("https://evil.example/v2.0"), "{logs}");
        assert!(logs.contains(gk_test_utils::TEST_AUDIENCE), "{logs}");
    }

    #[tokio::test]
    async fn test_expired_rejection_logs_presented_claims() {
        let claims = gk_test_utils::TestTokenBuilder::new().expires_in(-60).build();
        let token = gk_test_utils::TestRsaKey::primary().sign(&claims).unwrap();

        let (result, logs) = validate_with_logs(claims).await;

        assert_eq!(result, Err(AuthError::Expired));
        assert!(logs.contains(gk_test_utils::TEST_ISSUER), "{logs}");
        assert!(logs.contains(gk_test_utils::TEST_AUDIENCE), "{logs}");
        assert!(!logs.contains(&token), "token must never be logged");
    }
}

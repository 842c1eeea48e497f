//! Gatekeeper error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details (cache state, provider error text, which claim
//! failed). The precise reason is logged server-side at the failure site.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic message for every authentication failure.
const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Authentication and authorization failures.
///
/// Maps to HTTP status codes:
/// - NotAuthenticated: 401 with a bare `Bearer` challenge
/// - Malformed, UnsupportedAlgorithm, InvalidToken, Expired, InvalidAudience,
///   InvalidIssuer, MissingIdentity: 401 with an `invalid_token` challenge
/// - Forbidden: 403 Forbidden
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The token or its header could not be parsed.
    #[error("Malformed token")]
    Malformed,

    /// The header declared an algorithm other than RS256.
    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    /// Signature or structural verification failed (including after retry).
    #[error("Invalid token")]
    InvalidToken,

    /// The `exp` claim is in the past.
    #[error("Token expired")]
    Expired,

    /// No `aud` value matched an accepted audience.
    #[error("Invalid token audience")]
    InvalidAudience,

    /// The `iss` claim is not a trusted issuer.
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// The token verified but carries no usable identity claim.
    #[error("Token carries no usable identity")]
    MissingIdentity,

    /// Signing keys are unavailable and no usable cached set exists.
    #[error("Authentication service unavailable")]
    ServiceUnavailable,

    /// No credential was supplied.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The identity lacks the required role.
    #[error("Insufficient permissions")]
    Forbidden,
}

impl AuthError {
    /// Stable, bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Expired => "expired",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::MissingIdentity => "missing_identity",
            AuthError::ServiceUnavailable => "service_unavailable",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::Forbidden => "forbidden",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message, challenge) = match self {
            AuthError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "NOT_AUTHENTICATED",
                "Not authenticated",
                Some("Bearer"),
            ),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Insufficient permissions",
                None,
            ),
            AuthError::ServiceUnavailable => {
                tracing::warn!(target: "gk.availability", "Signing keys unavailable, rejecting request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable",
                    None,
                )
            }
            AuthError::Malformed
            | AuthError::UnsupportedAlgorithm
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::InvalidAudience
            | AuthError::InvalidIssuer
            | AuthError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                INVALID_TOKEN_MESSAGE,
                Some("Bearer realm=\"gatekeeper\", error=\"invalid_token\""),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();

        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const TOKEN_FAILURES: [AuthError; 7] = [
        AuthError::Malformed,
        AuthError::UnsupportedAlgorithm,
        AuthError::InvalidToken,
        AuthError::Expired,
        AuthError::InvalidAudience,
        AuthError::InvalidIssuer,
        AuthError::MissingIdentity,
    ];

    #[test]
    fn test_kinds_are_distinct() {
        let mut kinds: Vec<&str> = TOKEN_FAILURES.iter().map(AuthError::kind).collect();
        kinds.extend([
            AuthError::NotAuthenticated.kind(),
            AuthError::Forbidden.kind(),
            AuthError::ServiceUnavailable.kind(),
        ]);
        let total = kinds.len();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), total);
    }

    #[tokio::test]
    async fn test_token_failures_share_one_generic_response() {
        for err in TOKEN_FAILURES {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let www_auth = response
                .headers()
                .get("WWW-Authenticate")
                .expect("401 must carry a challenge")
                .to_str()
                .unwrap()
                .to_string();
            assert!(www_auth.starts_with("Bearer"));
            assert!(www_auth.contains("invalid_token"));

            let body = read_body_json(response.into_body()).await;
            assert_eq!(body["error"]["code"], "INVALID_TOKEN");
            assert_eq!(body["error"]["message"], INVALID_TOKEN_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_into_response_not_authenticated() {
        let response = AuthError::NotAuthenticated.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "NOT_AUTHENTICATED");
        assert_eq!(body["error"]["message"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_into_response_forbidden() {
        let response = AuthError::Forbidden.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "Insufficient permissions");
    }

    #[tokio::test]
    async fn test_into_response_service_unavailable() {
        let response = AuthError::ServiceUnavailable.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(
            body["error"]["message"],
            "Service temporarily unavailable"
        );
    }
}

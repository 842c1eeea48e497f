//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables. Provider endpoints,
//! trusted issuers and accepted audiences default to the values derived from
//! the tenant and client IDs.

use common::jwt::MAX_CLOCK_SKEW;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default JWKS cache TTL in seconds (24 hours).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 86_400;

/// Default bound on serving keys after failed refreshes (7 days).
pub const DEFAULT_JWKS_MAX_STALENESS_SECONDS: u64 = 604_800;

/// Default role required by the admin routes.
pub const DEFAULT_ADMIN_ROLE: &str = "IT.Admin";

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Gatekeeper configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Directory tenant ID.
    pub tenant_id: String,

    /// Application (client) ID this service accepts tokens for.
    pub client_id: String,

    /// JWKS endpoint of the identity provider.
    pub jwks_url: String,

    /// Accepted `iss` values.
    pub trusted_issuers: Vec<String>,

    /// Accepted `aud` values.
    pub accepted_audiences: Vec<String>,

    /// How long a fetched key set is considered fresh.
    pub jwks_cache_ttl: Duration,

    /// How old a retained key set may be and still be served when refresh fails.
    pub jwks_max_staleness: Duration,

    /// Leeway applied to `exp`/`nbf` checks.
    pub jwt_clock_skew: Duration,

    /// Role required by the admin route group.
    pub admin_role: String,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS cache configuration: {0}")]
    InvalidJwksCache(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let tenant_id = required(vars, "AZURE_TENANT_ID")?;
        let client_id = required(vars, "AZURE_CLIENT_ID")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars.get("JWKS_URL").cloned().unwrap_or_else(|| {
            format!("https://login.microsoftonline.com/{tenant_id}/discovery/v2.0/keys")
        });

        let trusted_issuers = list(vars, "TRUSTED_ISSUERS")?.unwrap_or_else(|| {
            vec![
                format!("https://login.microsoftonline.com/{tenant_id}/v2.0"),
                format!("https://sts.windows.net/{tenant_id}/"),
            ]
        });

        let accepted_audiences = list(vars, "ACCEPTED_AUDIENCES")?
            .unwrap_or_else(|| vec![client_id.clone(), format!("api://{client_id}")]);

        // Parse JWKS cache TTL with validation
        let ttl_seconds = seconds(vars, "JWKS_CACHE_TTL_SECONDS", DEFAULT_JWKS_CACHE_TTL_SECONDS)
            .map_err(ConfigError::InvalidJwksCache)?;
        if ttl_seconds == 0 {
            return Err(ConfigError::InvalidJwksCache(
                "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        // Parse staleness bound; it can never be tighter than the TTL
        let staleness_seconds = seconds(
            vars,
            "JWKS_MAX_STALENESS_SECONDS",
            DEFAULT_JWKS_MAX_STALENESS_SECONDS.max(ttl_seconds),
        )
        .map_err(ConfigError::InvalidJwksCache)?;
        if staleness_seconds < ttl_seconds {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_MAX_STALENESS_SECONDS must be at least JWKS_CACHE_TTL_SECONDS ({}), got {}",
                ttl_seconds, staleness_seconds
            )));
        }

        // Parse JWT clock skew tolerance with validation
        let skew_seconds = seconds(vars, "JWT_CLOCK_SKEW_SECONDS", 0)
            .map_err(ConfigError::InvalidJwtClockSkew)?;
        if skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                skew_seconds
            )));
        }

        let admin_role = match vars.get("ADMIN_ROLE").map(|r| r.trim()) {
            Some("") => {
                return Err(ConfigError::InvalidValue(
                    "ADMIN_ROLE".to_string(),
                    "must not be empty".to_string(),
                ))
            }
            Some(role) => role.to_string(),
            None => DEFAULT_ADMIN_ROLE.to_string(),
        };

        let drain_seconds = seconds(vars, "GK_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)
            .map_err(|msg| ConfigError::InvalidValue("GK_DRAIN_SECONDS".to_string(), msg))?;

        Ok(Config {
            bind_address,
            tenant_id,
            client_id,
            jwks_url,
            trusted_issuers,
            accepted_audiences,
            jwks_cache_ttl: Duration::from_secs(ttl_seconds),
            jwks_max_staleness: Duration::from_secs(staleness_seconds),
            jwt_clock_skew: Duration::from_secs(skew_seconds),
            admin_role,
            drain_seconds,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse a comma separated list. Blank entries are dropped; an all-blank
/// value is an error rather than an empty allow-list.
fn list(vars: &HashMap<String, String>, name: &str) -> Result<Option<Vec<String>>, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(None);
    };

    let values: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    if values.is_empty() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must contain at least one value".to_string(),
        ));
    }

    Ok(Some(values))
}

fn seconds(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, String> {
    match vars.get(name) {
        None => Ok(default),
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            )
        }),
    }
}

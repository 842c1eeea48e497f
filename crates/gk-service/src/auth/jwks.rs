//! JWKS key cache for the identity provider's signing keys.
//!
//! Fetches the provider's JSON Web Key Set and keeps the RS256 verification
//! keys in memory, indexed by key ID.
//!
//! # Refresh model
//!
//! - No background timer: a fetch happens only when a lookup finds the cache
//!   empty, older than its TTL, or missing the requested `kid`
//! - A lookup that still misses after a normal fetch retries once with a
//!   forced fetch, which absorbs provider key rotation
//! - At most one fetch is in flight per cache; concurrent callers await the
//!   same shared fetch instead of issuing parallel HTTP requests
//! - A successful fetch replaces the whole key set in one swap
//! - A failed fetch keeps serving the previous key set, up to
//!   `max_staleness` old. Each such serve is logged and counted
//!
//! # Security
//!
//! - Keys without a `kid`, non-RSA keys and keys not meant for signatures
//!   are dropped at fetch time
//! - HTTPS should be used in production (enforced by deployment config)

use crate::observability::metrics::{record_jwks_refresh, record_jwks_stale_serve};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Default cache TTL (24 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86_400);

/// Default upper bound on how old a key set may be and still be served
/// after a failed fetch (7 days).
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(7 * 86_400);

/// Hard timeout for a single JWKS fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (only "RSA" is usable).
    pub kty: String,

    /// Key ID. Keys without one are ignored.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm hint, when published.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use, when published ("sig" for signing keys).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// Why a JWKS fetch failed. Never shown to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwksFetchError {
    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS response could not be parsed: {0}")]
    Parse(String),

    #[error("JWKS response contained no usable signing keys")]
    NoUsableKeys,
}

/// Failure to supply a verification key.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum KeyCacheError {
    /// The key set is available but does not contain the requested `kid`.
    #[error("Signing key not found")]
    KeyNotFound,

    /// No usable key set could be obtained.
    #[error("Signing keys could not be fetched")]
    FetchFailed,
}

/// Source of JWKS documents.
///
/// The production implementation is [`HttpJwksFetcher`]; tests inject their
/// own to count fetches and simulate outages deterministically.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwksResponse, JwksFetchError>;
}

/// Fetches the JWKS document over HTTP(S).
pub struct HttpJwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Create a fetcher for `jwks_url` with a [`FETCH_TIMEOUT`] request timeout.
    pub fn new(jwks_url: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gk.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<JwksResponse, JwksFetchError> {
        tracing::debug!(target: "gk.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JwksFetchError::Status(status.as_u16()));
        }

        response
            .json::<JwksResponse>()
            .await
            .map_err(|e| JwksFetchError::Parse(e.to_string()))
    }
}

/// A complete key set from one successful fetch.
struct CachedKeySet {
    /// Map of key ID to verification key.
    keys: HashMap<String, DecodingKey>,

    /// When this set was fetched.
    fetched_at: Instant,
}

impl CachedKeySet {
    fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<usize, JwksFetchError>>>;

/// Process-wide signing key cache.
///
/// Construct one per hosting process and share it via `Arc`.
pub struct JwksClient {
    fetcher: Arc<dyn JwksFetcher>,

    /// Current key set. Replaced wholesale; never mutated in place.
    cache: Arc<RwLock<Option<Arc<CachedKeySet>>>>,

    /// The fetch currently in flight, if any.
    in_flight: Mutex<Option<SharedFetch>>,

    cache_ttl: Duration,

    max_staleness: Duration,
}

impl JwksClient {
    /// Create a cache that fetches from `jwks_url` with the default TTL.
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, DEFAULT_CACHE_TTL)
    }

    /// Create a cache that fetches from `jwks_url` with a custom TTL.
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        Self::with_fetcher(Arc::new(HttpJwksFetcher::new(jwks_url)), cache_ttl)
    }

    /// Create a cache backed by an arbitrary fetcher.
    pub fn with_fetcher(fetcher: Arc<dyn JwksFetcher>, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: Arc::new(RwLock::new(None)),
            in_flight: Mutex::new(None),
            cache_ttl,
            max_staleness: DEFAULT_MAX_STALENESS.max(cache_ttl),
        }
    }

    /// Bound how old a retained key set may be when a refresh fails.
    ///
    /// Values below the TTL are raised to the TTL.
    #[must_use]
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness.max(self.cache_ttl);
        self
    }

    /// Get the verification key for `kid`.
    ///
    /// Fetches first when `force_refresh` is set, the cache is empty, the
    /// cache is older than its TTL, or `kid` is unknown. A miss after a
    /// non-forced fetch is retried once with a forced fetch.
    ///
    /// # Errors
    ///
    /// Returns `KeyCacheError::FetchFailed` if no usable key set exists.
    /// Returns `KeyCacheError::KeyNotFound` if the key set lacks `kid`.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_signing_key(
        &self,
        kid: &str,
        force_refresh: bool,
    ) -> Result<DecodingKey, KeyCacheError> {
        let mut forced = force_refresh;

        loop {
            let mut key_set = self.snapshot().await;

            let needs_fetch = forced
                || match key_set.as_deref() {
                    None => true,
                    Some(set) => set.age() > self.cache_ttl || !set.keys.contains_key(kid),
                };

            if needs_fetch {
                key_set = Some(self.refresh().await?);
            } else {
                tracing::debug!(target: "gk.auth.jwks", kid = %kid, "JWKS cache hit");
            }

            if let Some(key) = key_set.as_deref().and_then(|set| set.keys.get(kid)) {
                return Ok(key.clone());
            }

            if forced {
                tracing::warn!(target: "gk.auth.jwks", kid = %kid, "Signing key not found after forced JWKS refresh");
                return Err(KeyCacheError::KeyNotFound);
            }

            tracing::debug!(target: "gk.auth.jwks", kid = %kid, "Key not in JWKS, retrying with forced refresh");
            forced = true;
        }
    }

    /// Fetch the key set now, regardless of freshness.
    ///
    /// # Errors
    ///
    /// Returns `KeyCacheError::FetchFailed` if the fetch fails and no usable
    /// key set is retained.
    pub async fn force_refresh(&self) -> Result<(), KeyCacheError> {
        self.refresh().await.map(|_| ())
    }

    /// Number of keys in the current key set.
    pub async fn key_count(&self) -> usize {
        self.snapshot()
            .await
            .map_or(0, |set| set.keys.len())
    }

    /// Whether a lookup could be served right now.
    ///
    /// A fresh key set answers immediately. An empty or expired one triggers
    /// (or joins) a fetch, and a failed fetch still counts as servable while
    /// the retained set is within `max_staleness`.
    pub async fn has_servable_keys(&self) -> bool {
        if self
            .snapshot()
            .await
            .is_some_and(|set| set.age() <= self.cache_ttl)
        {
            return true;
        }

        self.refresh().await.is_ok()
    }

    async fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.cache.read().await.clone()
    }

    /// Run (or join) a fetch and return the key set to serve afterwards.
    async fn refresh(&self) -> Result<Arc<CachedKeySet>, KeyCacheError> {
        let fetch = self.join_or_start_fetch().await;
        let outcome = fetch.clone().await;
        self.clear_in_flight(&fetch).await;

        let retained = self.snapshot().await;

        match (outcome, retained) {
            (Ok(_), Some(set)) => Ok(set),
            (Ok(_), None) => Err(KeyCacheError::FetchFailed),
            (Err(e), Some(set)) if set.age() <= self.max_staleness => {
                tracing::warn!(
                    target: "gk.auth.jwks",
                    error = %e,
                    age_seconds = set.age().as_secs(),
                    key_count = set.keys.len(),
                    "JWKS refresh failed, serving previously fetched keys"
                );
                record_jwks_stale_serve();
                Ok(set)
            }
            (Err(e), Some(set)) => {
                tracing::error!(
                    target: "gk.auth.jwks",
                    error = %e,
                    age_seconds = set.age().as_secs(),
                    max_staleness_seconds = self.max_staleness.as_secs(),
                    "JWKS refresh failed and cached keys exceed max staleness"
                );
                Err(KeyCacheError::FetchFailed)
            }
            (Err(e), None) => {
                tracing::error!(target: "gk.auth.jwks", error = %e, "JWKS refresh failed with no cached keys");
                Err(KeyCacheError::FetchFailed)
            }
        }
    }

    async fn join_or_start_fetch(&self) -> SharedFetch {
        let mut in_flight = self.in_flight.lock().await;

        // A completed fetch can be left behind when its caller was cancelled
        // before clearing the slot; it must never stand in for a new fetch.
        if let Some(fetch) = in_flight.as_ref().filter(|fetch| fetch.peek().is_none()) {
            tracing::debug!(target: "gk.auth.jwks", "Joining in-flight JWKS fetch");
            return fetch.clone();
        }

        let fetch = fetch_and_swap(Arc::clone(&self.fetcher), Arc::clone(&self.cache))
            .boxed()
            .shared();
        *in_flight = Some(fetch.clone());
        fetch
    }

    async fn clear_in_flight(&self, fetch: &SharedFetch) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .as_ref()
            .is_some_and(|current| current.ptr_eq(fetch))
        {
            *in_flight = None;
        }
    }
}

/// Fetch the JWKS and, on success, swap in the new key set.
async fn fetch_and_swap(
    fetcher: Arc<dyn JwksFetcher>,
    cache: Arc<RwLock<Option<Arc<CachedKeySet>>>>,
) -> Result<usize, JwksFetchError> {
    let start = Instant::now();

    let result = match fetcher.fetch().await {
        Ok(jwks) => {
            let keys = build_key_map(jwks.keys);
            if keys.is_empty() {
                Err(JwksFetchError::NoUsableKeys)
            } else {
                Ok(keys)
            }
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(keys) => {
            let key_count = keys.len();
            *cache.write().await = Some(Arc::new(CachedKeySet {
                keys,
                fetched_at: Instant::now(),
            }));

            tracing::info!(target: "gk.auth.jwks", key_count, "JWKS cache refreshed");
            record_jwks_refresh("success", start.elapsed());
            Ok(key_count)
        }
        Err(e) => {
            tracing::error!(target: "gk.auth.jwks", error = %e, "Failed to fetch JWKS");
            record_jwks_refresh("error", start.elapsed());
            Err(e)
        }
    }
}

/// Convert published keys into verification keys, dropping unusable ones.
fn build_key_map(jwks: Vec<Jwk>) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::with_capacity(jwks.len());

    for jwk in jwks {
        let Some(kid) = jwk.kid.filter(|kid| !kid.is_empty()) else {
            tracing::debug!(target: "gk.auth.jwks", "Ignoring JWK without kid");
            continue;
        };

        if jwk.kty != "RSA" {
            tracing::debug!(target: "gk.auth.jwks", kid = %kid, kty = %jwk.kty, "Ignoring non-RSA JWK");
            continue;
        }
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            tracing::debug!(target: "gk.auth.jwks", kid = %kid, "Ignoring JWK not intended for signatures");
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            tracing::debug!(target: "gk.auth.jwks", kid = %kid, "Ignoring JWK for another algorithm");
            continue;
        }

        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            tracing::warn!(target: "gk.auth.jwks", kid = %kid, "Ignoring RSA JWK without modulus or exponent");
            continue;
        };

        match DecodingKey::from_rsa_components(n, e) {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(err) => {
                tracing::warn!(target: "gk.auth.jwks", kid = %kid, error = %err, "Ignoring JWK with invalid key material");
            }
        }
    }

    keys
}

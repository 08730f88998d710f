//! JWKS-backed access-token verification.
//!
//! This adapter implements the `TokenVerifier` port for tokens signed by the
//! identity provider's rotating RSA keys. It validates a token by:
//!
//! 1. Reading the header and rejecting anything but RS256 (no `none`, no HMAC)
//! 2. Resolving the signing key by `kid` from the [`KeyCache`]
//! 3. Checking the signature with `jsonwebtoken`
//! 4. Checking issuer (HTTPS, allow-listed host) and audience (case-insensitive)
//! 5. Building typed [`TokenClaims`] and finally checking `exp <= now`
//!
//! An expired but otherwise valid token yields `TokenError::Expired` carrying
//! the parsed claims so the session manager can attempt a refresh.
//!
//! # Example
//!
//! ```ignore
//! let config = JwksConfig::new(
//!     "https://api.workos.com/sso/jwks/client_123",
//!     "client_123",
//!     vec!["api.workos.com".to_string()],
//! );
//! let verifier = JwksTokenVerifier::new(config)?;
//! let claims = verifier.verify("eyJ...").await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::domain::foundation::Timestamp;
use crate::domain::session::{TokenClaims, TokenError};
use crate::ports::TokenVerifier;

const SUPPORTED_ALGORITHM: &str = "RS256";

/// Configuration for the JWKS verifier.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    /// Where the provider publishes its signing keys.
    pub jwks_url: String,

    /// Expected audience; tokens must list this client id.
    pub client_id: String,

    /// Hosts accepted in the `iss` claim. Scheme must be https.
    pub allowed_issuer_hosts: Vec<String>,

    /// How long a fetched key set stays fresh.
    pub cache_ttl: Duration,

    /// Bound on the JWKS fetch.
    pub http_timeout: Duration,
}

impl JwksConfig {
    pub fn new(
        jwks_url: impl Into<String>,
        client_id: impl Into<String>,
        allowed_issuer_hosts: Vec<String>,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            client_id: client_id.into(),
            allowed_issuer_hosts,
            cache_ttl: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Key cache
// ════════════════════════════════════════════════════════════════════════════

/// One fetched key set with its fetch time.
struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn new(keys: HashMap<String, DecodingKey>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.keys.is_empty() || self.fetched_at.elapsed() > ttl
    }
}

/// In-memory `kid -> key` map refreshed on TTL expiry, when empty, or when a
/// lookup misses.
///
/// Lookups share a read lock. Refreshes hold the write lock for the whole
/// fetch and re-check freshness after acquiring it, so concurrent misses
/// trigger one fetch, not many.
pub struct KeyCache {
    url: String,
    ttl: Duration,
    http_client: reqwest::Client,
    state: RwLock<Option<KeySet>>,
}

impl KeyCache {
    pub fn new(url: impl Into<String>, ttl: Duration, http_client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            ttl,
            http_client,
            state: RwLock::new(None),
        }
    }

    /// Resolve a key, refreshing at most once if it is unknown or stale.
    ///
    /// Returns `Ok(None)` when a fresh key set does not contain `kid`.
    pub async fn lookup(&self, kid: &str) -> Result<Option<DecodingKey>, TokenError> {
        let seen = {
            let state = self.state.read().await;
            match state.as_ref() {
                Some(set) if !set.is_stale(self.ttl) => {
                    if let Some(key) = set.keys.get(kid) {
                        return Ok(Some(key.clone()));
                    }
                    Some(set.fetched_at)
                }
                Some(set) => Some(set.fetched_at),
                None => None,
            }
        };

        let mut state = self.state.write().await;
        if let Some(set) = state.as_ref() {
            // Another task refreshed while we waited for the lock.
            if Some(set.fetched_at) != seen && !set.is_stale(self.ttl) {
                return Ok(set.keys.get(kid).cloned());
            }
        }

        match self.fetch().await {
            Ok(keys) => {
                let set = KeySet::new(keys);
                let key = set.keys.get(kid).cloned();
                *state = Some(set);
                Ok(key)
            }
            Err(err) => match state.as_ref().and_then(|set| set.keys.get(kid)) {
                Some(key) => {
                    tracing::warn!(kid, "JWKS refresh failed, serving cached key");
                    Ok(Some(key.clone()))
                }
                None => Err(err),
            },
        }
    }

    /// Refetch the key set. Without `force`, a fresh set is left alone.
    pub async fn refresh(&self, force: bool) -> Result<(), TokenError> {
        let mut state = self.state.write().await;
        if !force {
            if let Some(set) = state.as_ref() {
                if !set.is_stale(self.ttl) {
                    return Ok(());
                }
            }
        }
        let keys = self.fetch().await?;
        *state = Some(KeySet::new(keys));
        Ok(())
    }

    /// Number of usable keys currently cached.
    pub async fn key_count(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map(|set| set.keys.len())
            .unwrap_or(0)
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, TokenError> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        let response = self.http_client.get(&self.url).send().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch JWKS");
            TokenError::KeysUnavailable
        })?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "JWKS endpoint returned error status");
            return Err(TokenError::KeysUnavailable);
        }

        let body = response.text().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read JWKS body");
            TokenError::KeysUnavailable
        })?;

        let keys = parse_jwks(&body)?;
        tracing::debug!(count = keys.len(), "Fetched JWKS");
        Ok(keys)
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

#[derive(Deserialize)]
struct RsaJwk {
    kty: String,
    kid: String,
    n: String,
    e: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    usage: Option<String>,
}

/// Parse a JWKS document into RSA signing keys.
///
/// Entries that are not RS256 signing keys, or are malformed, are skipped;
/// only an unparseable document is an error.
fn parse_jwks(body: &str) -> Result<HashMap<String, DecodingKey>, TokenError> {
    let document: JwksDocument = serde_json::from_str(body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS");
        TokenError::KeysUnavailable
    })?;

    let mut keys = HashMap::new();
    for entry in document.keys {
        let jwk: RsaJwk = match serde_json::from_value(entry) {
            Ok(jwk) => jwk,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed JWK");
                continue;
            }
        };
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != SUPPORTED_ALGORITHM) {
            continue;
        }
        if jwk.usage.as_deref().is_some_and(|usage| usage != "sig") {
            continue;
        }
        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys.insert(jwk.kid, key);
            }
            Err(e) => tracing::debug!(kid = %jwk.kid, error = %e, "Skipping unusable JWK"),
        }
    }
    Ok(keys)
}

// ════════════════════════════════════════════════════════════════════════════
// Verifier
// ════════════════════════════════════════════════════════════════════════════

/// Production `TokenVerifier`.
pub struct JwksTokenVerifier {
    cache: KeyCache,
    client_id: String,
    allowed_issuer_hosts: Vec<String>,
}

impl JwksTokenVerifier {
    /// Build the verifier. Keys are fetched lazily on first use.
    pub fn new(config: JwksConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self::with_client(config, http_client))
    }

    pub fn with_client(config: JwksConfig, http_client: reqwest::Client) -> Self {
        Self {
            cache: KeyCache::new(config.jwks_url, config.cache_ttl, http_client),
            client_id: config.client_id,
            allowed_issuer_hosts: config
                .allowed_issuer_hosts
                .into_iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Verify against an explicit clock, in Unix seconds.
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let kid = read_header(token)?;
        let key = self.cache.lookup(&kid).await?.ok_or_else(|| {
            tracing::debug!(kid = %kid, "No signing key for kid");
            TokenError::UnknownKey
        })?;

        let raw = decode_claims(token, &key)?;

        match raw.get("iss") {
            Some(Value::String(iss)) => {
                if !issuer_allowed(iss, &self.allowed_issuer_hosts) {
                    tracing::debug!(issuer = %iss, "Token issuer not allowed");
                    return Err(TokenError::InvalidIssuer);
                }
            }
            None | Some(Value::Null) => return Err(TokenError::MissingClaim("iss")),
            Some(_) => return Err(TokenError::InvalidClaim("iss")),
        }

        if !audience_matches(raw.get("aud"), &self.client_id) {
            tracing::debug!("Token audience does not include client id");
            return Err(TokenError::InvalidAudience);
        }

        let claims = TokenClaims::from_map(raw)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired(Box::new(claims)));
        }
        Ok(claims)
    }
}

#[async_trait]
impl TokenVerifier for JwksTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Timestamp::now().as_unix_secs()).await
    }
}

impl std::fmt::Debug for JwksTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksTokenVerifier")
            .field("client_id", &self.client_id)
            .field("allowed_issuer_hosts", &self.allowed_issuer_hosts)
            .finish_non_exhaustive()
    }
}

/// Check `alg` before anything else and return the `kid`.
///
/// `jsonwebtoken::decode_header` cannot represent `none`, so the header is
/// read by hand to report it as an unsupported algorithm.
fn read_header(token: &str) -> Result<String, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed)?;
    let header: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    match header.get("alg") {
        Some(Value::String(alg)) if alg == SUPPORTED_ALGORITHM => {}
        Some(Value::String(alg)) => {
            tracing::debug!(alg = %alg, "Rejecting token algorithm");
            return Err(TokenError::UnsupportedAlgorithm(alg.clone()));
        }
        _ => return Err(TokenError::Malformed),
    }

    match header.get("kid") {
        Some(Value::String(kid)) if !kid.trim().is_empty() => Ok(kid.clone()),
        _ => Err(TokenError::MissingKeyId),
    }
}

/// Signature check only; every claim rule is applied afterwards so each
/// failure gets its own error.
fn decode_claims(token: &str, key: &DecodingKey) -> Result<Map<String, Value>, TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims = HashSet::new();

    decode::<Map<String, Value>>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidRsaKey(_) => {
                    tracing::debug!("Token signature invalid");
                    TokenError::InvalidSignature
                }
                ErrorKind::InvalidAlgorithm => {
                    TokenError::UnsupportedAlgorithm(SUPPORTED_ALGORITHM.to_string())
                }
                _ => {
                    tracing::debug!(error = %e, "Token could not be decoded");
                    TokenError::Malformed
                }
            }
        })
}

fn issuer_allowed(issuer: &str, allowed_hosts: &[String]) -> bool {
    let Ok(parsed) = url::Url::parse(issuer.trim()) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    match parsed.host_str() {
        Some(host) => allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host)),
        None => false,
    }
}

fn audience_matches(aud: Option<&Value>, client_id: &str) -> bool {
    match aud {
        Some(Value::String(single)) => single.eq_ignore_ascii_case(client_id),
        Some(Value::Array(many)) => many
            .iter()
            .filter_map(Value::as_str)
            .any(|candidate| candidate.eq_ignore_ascii_case(client_id)),
        _ => false,
    }
}

//! Key-set fetching, caching and key resolution

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use super::error::{Result, VerifyError};
use crate::observability;

/// JSON Web Key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key type (RSA, EC)
    pub kty: String,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Key usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
    // RSA components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    // EC components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// JSON Web Key Set as published by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A verification key selected by identifier
#[derive(Clone)]
pub struct ResolvedKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Source of verification keys, looked up by key identifier.
///
/// [`JwksCache`] resolves against a remote key set; the identity provider
/// emulator resolves against its own signing key.
#[async_trait]
pub trait KeyResolver: Send + Sync + std::fmt::Debug {
    async fn resolve_key(&self, kid: &str) -> Result<ResolvedKey>;
}

/// Immutable snapshot of a fetched key set
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, ResolvedKey>,
    fetched_at: Instant,
}

impl KeySet {
    /// Build a snapshot; keys without `kid` or with unsupported parameters are skipped.
    pub fn from_jwk_set(jwks: &JwkSet, fetched_at: Instant) -> Self {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.kid.as_deref() else {
                tracing::debug!(kty = %jwk.kty, "Skipping key without kid");
                continue;
            };
            match decode_jwk(jwk) {
                Ok(Some((key, algorithm))) => {
                    keys.insert(
                        kid.to_string(),
                        ResolvedKey {
                            kid: kid.to_string(),
                            algorithm,
                            key,
                        },
                    );
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(kid, error = %e, "Skipping invalid key"),
            }
        }
        Self { keys, fetched_at }
    }

    pub fn get(&self, kid: &str) -> Option<&ResolvedKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Thread-safe key-set cache.
///
/// The current set is swapped atomically and only after a successful fetch, so
/// a failed refresh never erases a previously valid set. Callers that find the
/// cache stale serialize on `refresh_lock` and re-check freshness, which
/// collapses concurrent refreshes into a single request.
pub struct JwksCache {
    current: ArcSwapOption<KeySet>,
    refresh_lock: Mutex<()>,
    jwks_uri: Url,
    client: reqwest::Client,
    ttl: Duration,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("ttl", &self.ttl)
            .field("keys_count", &self.current.load_full().map_or(0, |s| s.len()))
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// The client should carry the fetch timeout (see `JWKS_FETCH_TIMEOUT`).
    pub fn new(jwks_uri: Url, ttl: Duration, client: reqwest::Client) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            jwks_uri,
            client,
            ttl,
        }
    }

    pub const fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Current key set, fetching it when absent or older than the TTL.
    pub async fn key_set(&self) -> Result<Arc<KeySet>> {
        if let Some(set) = self.fresh() {
            return Ok(set);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(set) = self.fresh() {
            return Ok(set);
        }
        self.fetch_and_store().await
    }

    /// Unconditionally refetch the key set.
    pub async fn refresh(&self) -> Result<Arc<KeySet>> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Last successfully fetched set, regardless of age.
    pub fn cached(&self) -> Option<Arc<KeySet>> {
        self.current.load_full()
    }

    fn fresh(&self) -> Option<Arc<KeySet>> {
        self.current
            .load_full()
            .filter(|set| set.fetched_at.elapsed() <= self.ttl)
    }

    async fn fetch_and_store(&self) -> Result<Arc<KeySet>> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "Refreshing JWKS");

        let fetched = self.fetch().await;
        observability::record_jwks_refresh(fetched.is_ok());

        let jwks = fetched.inspect_err(|e| {
            tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
        })?;

        let set = Arc::new(KeySet::from_jwk_set(&jwks, Instant::now()));
        self.current.store(Some(Arc::clone(&set)));

        tracing::info!(keys_count = set.len(), "JWKS refreshed successfully");
        Ok(set)
    }

    async fn fetch(&self) -> Result<JwkSet> {
        let response = self
            .client
            .get(self.jwks_uri.clone())
            .send()
            .await?
            .error_for_status()?;

        response.json::<JwkSet>().await.map_err(|e| {
            VerifyError::IdentityProviderUnavailable(format!("invalid key set document: {e}"))
        })
    }

    #[cfg(test)]
    pub(crate) fn install(&self, set: KeySet) {
        self.current.store(Some(Arc::new(set)));
    }
}

#[async_trait]
impl KeyResolver for JwksCache {
    async fn resolve_key(&self, kid: &str) -> Result<ResolvedKey> {
        let set = self.key_set().await?;
        set.get(kid)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_string()))
    }
}

fn decode_jwk(jwk: &Jwk) -> std::result::Result<Option<(DecodingKey, Algorithm)>, String> {
    let alg = match jwk.alg.as_deref() {
        Some("RS256") => Algorithm::RS256,
        Some("RS384") => Algorithm::RS384,
        Some("RS512") => Algorithm::RS512,
        Some("ES256") => Algorithm::ES256,
        Some("ES384") => Algorithm::ES384,
        None => {
            // Infer from key type
            match jwk.kty.as_str() {
                "RSA" => Algorithm::RS256,
                "EC" => match jwk.crv.as_deref() {
                    Some("P-256") => Algorithm::ES256,
                    Some("P-384") => Algorithm::ES384,
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        _ => return Ok(None),
    };

    let key = match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_ref().ok_or("missing 'n' in RSA key")?;
            let e = jwk.e.as_ref().ok_or("missing 'e' in RSA key")?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| format!("invalid RSA components: {e}"))?
        }
        "EC" => {
            let x = jwk.x.as_ref().ok_or("missing 'x' in EC key")?;
            let y = jwk.y.as_ref().ok_or("missing 'y' in EC key")?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| format!("invalid EC components: {e}"))?
        }
        other => {
            tracing::debug!(kty = other, "Skipping unsupported key type");
            return Ok(None);
        }
    };

    Ok(Some((key, alg)))
}

/// Background key-set refresh task builder
pub struct JwksRefreshTask {
    cache: Arc<JwksCache>,
    interval: Duration,
}

impl std::fmt::Debug for JwksRefreshTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksRefreshTask")
            .field("cache", &self.cache)
            .field("interval", &self.interval)
            .finish()
    }
}

impl JwksRefreshTask {
    #[must_use]
    pub const fn new(cache: Arc<JwksCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub fn spawn(
        self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.cache.refresh().await {
                            tracing::warn!(error = %e, "Background JWKS refresh failed");
                        }
                    }
                    () = shutdown.cancelled() => {
                        tracing::debug!("JWKS refresh task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::idp::test_signing_key;

    fn unreachable_cache(ttl: Duration) -> JwksCache {
        // Port 9 (discard) on loopback is closed in test environments.
        JwksCache::new(
            Url::parse("http://127.0.0.1:9/.well-known/jwks.json").unwrap(),
            ttl,
            reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_jwk_set_deserialize() {
        let json = r#"{
            "keys": [
                {
                    "kid": "key1",
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "test_n",
                    "e": "AQAB"
                }
            ]
        }"#;
        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, Some("key1".to_string()));
        assert_eq!(jwks.keys[0].kty, "RSA");
        assert_eq!(jwks.keys[0].r#use, Some("sig".to_string()));
    }

    #[test]
    fn test_jwk_ec_deserialize() {
        let json = r#"{
            "keys": [
                {
                    "kid": "ec-key",
                    "kty": "EC",
                    "alg": "ES256",
                    "crv": "P-256",
                    "x": "test_x",
                    "y": "test_y"
                }
            ]
        }"#;
        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].crv, Some("P-256".to_string()));
    }

    #[test]
    fn test_key_set_from_published_jwks() {
        let jwks = test_signing_key().jwks();
        let set = KeySet::from_jwk_set(&jwks, Instant::now());
        assert_eq!(set.len(), 1);
        let key = set.get(test_signing_key().kid()).unwrap();
        assert_eq!(key.algorithm, Algorithm::RS256);
    }

    #[test]
    fn test_key_set_skips_keys_without_kid_or_unknown_type() {
        let jwks = JwkSet {
            keys: vec![
                Jwk {
                    kid: None,
                    kty: "RSA".into(),
                    alg: Some("RS256".into()),
                    r#use: None,
                    n: Some("AQAB".into()),
                    e: Some("AQAB".into()),
                    crv: None,
                    x: None,
                    y: None,
                },
                Jwk {
                    kid: Some("oct".into()),
                    kty: "oct".into(),
                    alg: None,
                    r#use: None,
                    n: None,
                    e: None,
                    crv: None,
                    x: None,
                    y: None,
                },
            ],
        };
        let set = KeySet::from_jwk_set(&jwks, Instant::now());
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_set() {
        let cache = unreachable_cache(Duration::ZERO);
        cache.install(KeySet::from_jwk_set(
            &test_signing_key().jwks(),
            Instant::now() - Duration::from_secs(1),
        ));

        let result = cache.key_set().await;
        assert!(matches!(
            result,
            Err(VerifyError::IdentityProviderUnavailable(_))
        ));

        let cached = cache.cached().expect("previous set retained");
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_set_served_without_fetch() {
        let cache = unreachable_cache(Duration::from_secs(300));
        cache.install(KeySet::from_jwk_set(
            &test_signing_key().jwks(),
            Instant::now(),
        ));

        let key = cache.resolve_key(test_signing_key().kid()).await.unwrap();
        assert_eq!(key.kid, test_signing_key().kid());
    }

    #[tokio::test]
    async fn test_resolve_unknown_kid() {
        let cache = unreachable_cache(Duration::from_secs(300));
        cache.install(KeySet::from_jwk_set(
            &test_signing_key().jwks(),
            Instant::now(),
        ));

        let result = cache.resolve_key("rotated-away").await;
        assert!(matches!(result, Err(VerifyError::UnknownKey(kid)) if kid == "rotated-away"));
    }

    #[tokio::test]
    async fn test_empty_cache_fetch_failure() {
        let cache = unreachable_cache(Duration::from_secs(300));
        assert!(cache.cached().is_none());
        let result = cache.resolve_key("any").await;
        assert!(matches!(
            result,
            Err(VerifyError::IdentityProviderUnavailable(_))
        ));
        assert!(cache.cached().is_none());
    }

    /// Serve the test key set on an ephemeral port, counting fetches.
    async fn serve_jwks(delay: Duration) -> (Url, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/jwks",
            axum::routing::get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    axum::Json(test_signing_key().jwks())
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (Url::parse(&format!("http://{addr}/jwks")).unwrap(), hits)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_share_one_fetch() {
        let (uri, hits) = serve_jwks(Duration::from_millis(200)).await;
        let cache = Arc::new(JwksCache::new(
            uri,
            Duration::from_secs(300),
            reqwest::Client::new(),
        ));

        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.key_set().await })
            })
            .collect();
        for lookup in lookups {
            let set = lookup.await.unwrap().unwrap();
            assert_eq!(set.len(), 1);
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_task_refetches_until_cancelled() {
        let (uri, hits) = serve_jwks(Duration::ZERO).await;
        let cache = Arc::new(JwksCache::new(
            uri,
            Duration::from_secs(300),
            reqwest::Client::new(),
        ));
        assert!(cache.cached().is_none());

        let shutdown = tokio_util::sync::CancellationToken::new();
        let handle = JwksRefreshTask::new(Arc::clone(&cache), Duration::from_millis(10))
            .spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let fetched = hits.load(Ordering::SeqCst);
        assert!(fetched >= 2, "expected repeated refreshes, saw {fetched}");
        assert_eq!(cache.cached().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), fetched);
    }
}

//! Signing keys for token validation.
//!
//! The request path only ever reads the current [`KeySet`] snapshot. Fetching
//! happens on background tasks: when the set goes stale, or when a token names
//! a key id the set does not contain. Background attempts, failed ones
//! included, are spaced by a retry interval so an unreachable endpoint is not
//! hit once per request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::config::OAuth2Config;
use super::error::OAuth2Error;

/// Background refreshes are not attempted more often than this.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Key set
// ─────────────────────────────────────────────────────────────────────────────

/// Decoding keys by key id, plus an optional key for tokens without a `kid`.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fallback: Option<DecodingKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    /// Key used for tokens whose header has no `kid`.
    pub fn with_fallback(mut self, key: DecodingKey) -> Self {
        self.fallback = Some(key);
        self
    }

    /// Build from a JWKS document. Keys that cannot be decoded are skipped.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut set = Self::new();
        for jwk in &jwks.keys {
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    warn!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                    continue;
                }
            };
            match &jwk.common.key_id {
                Some(kid) => {
                    set.keys.insert(kid.clone(), key);
                }
                None if jwks.keys.len() == 1 => set.fallback = Some(key),
                None => warn!("Skipping JWK without kid in multi-key set"),
            }
        }
        set
    }

    pub fn get(&self, kid: Option<&str>) -> Option<&DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid),
            None => self.fallback.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Supplies the key set a strategy validates against.
pub trait KeySetSource: Send + Sync + 'static {
    /// Current snapshot. Must not block on the network.
    fn key_set(&self) -> Arc<KeySet>;

    /// A token referenced a key the snapshot lacks. Sources that can
    /// refresh should do so in the background.
    fn request_refresh(&self) {}
}

/// Fixed keys, configured at startup.
#[derive(Debug, Clone)]
pub struct StaticKeySet(Arc<KeySet>);

impl StaticKeySet {
    pub fn new(keys: KeySet) -> Self {
        Self(Arc::new(keys))
    }
}

impl KeySetSource for StaticKeySet {
    fn key_set(&self) -> Arc<KeySet> {
        self.0.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JWKS cache
// ─────────────────────────────────────────────────────────────────────────────

/// Key set fetched from a JWKS endpoint and refreshed in the background.
#[derive(Clone)]
pub struct JwksCache {
    inner: Arc<JwksInner>,
}

struct JwksInner {
    url: String,
    ttl: Duration,
    client: reqwest::Client,
    keys: RwLock<Arc<KeySet>>,
    fetched_at: Mutex<Option<Instant>>,
    /// Start of the last background attempt, successful or not
    attempted_at: Mutex<Option<Instant>>,
    retry_interval: Duration,
    attempts: AtomicU64,
    refreshing: AtomicBool,
}

impl JwksCache {
    /// Create an empty cache. Call [`refresh`](Self::refresh) once at startup
    /// to populate it.
    pub fn new(url: impl Into<String>, ttl: Duration, fetch_timeout: Duration) -> Result<Self, OAuth2Error> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            inner: Arc::new(JwksInner {
                url: url.into(),
                ttl,
                client,
                keys: RwLock::new(Arc::new(KeySet::new())),
                fetched_at: Mutex::new(None),
                attempted_at: Mutex::new(None),
                retry_interval: MIN_REFRESH_INTERVAL,
                attempts: AtomicU64::new(0),
                refreshing: AtomicBool::new(false),
            }),
        })
    }

    /// Minimum spacing of background refresh attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_interval = interval;
        }
        self
    }

    pub fn from_config(config: &OAuth2Config) -> Result<Self, OAuth2Error> {
        let url = config
            .jwks_url
            .clone()
            .ok_or_else(|| OAuth2Error::Configuration("jwks_url is required".into()))?;
        Self::new(url, config.key_set_ttl, config.fetch_timeout)
    }

    /// Fetch the key set now. Returns how many keys were loaded.
    pub async fn refresh(&self) -> Result<usize, OAuth2Error> {
        self.inner.refresh().await
    }

    pub fn is_stale(&self) -> bool {
        self.inner.is_stale()
    }

    /// Background refreshes started so far.
    pub fn refresh_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Start a background refresh unless one is running or the last one
    /// began less than the retry interval ago.
    fn spawn_refresh(&self, reason: &'static str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.inner.recently_attempted() || self.inner.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.inner.attempted_at.lock() = Some(Instant::now());
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
        debug!(reason, url = %self.inner.url, "Scheduling key set refresh");
        let inner = self.inner.clone();
        runtime.spawn(async move {
            if let Err(e) = inner.refresh().await {
                warn!(error = %e, "Key set refresh failed");
            }
            inner.refreshing.store(false, Ordering::Release);
        });
    }
}

impl JwksInner {
    async fn refresh(&self) -> Result<usize, OAuth2Error> {
        let jwks: JwkSet = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys = KeySet::from_jwks(&jwks);
        let count = keys.len();
        *self.keys.write() = Arc::new(keys);
        *self.fetched_at.lock() = Some(Instant::now());
        info!(url = %self.url, keys = count, "Key set refreshed");
        Ok(count)
    }

    fn is_stale(&self) -> bool {
        match *self.fetched_at.lock() {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    fn recently_attempted(&self) -> bool {
        let recent = |at: &Option<Instant>| at.is_some_and(|at| at.elapsed() < self.retry_interval);
        recent(&self.fetched_at.lock()) || recent(&self.attempted_at.lock())
    }
}

impl KeySetSource for JwksCache {
    fn key_set(&self) -> Arc<KeySet> {
        if self.inner.is_stale() {
            self.spawn_refresh("stale");
        }
        self.inner.keys.read().clone()
    }

    fn request_refresh(&self) {
        self.spawn_refresh("unknown kid");
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("url", &self.inner.url)
            .field("keys", &*self.inner.keys.read())
            .finish()
    }
}

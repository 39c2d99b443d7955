//! Provider signing keys and their cache.
//!
//! Each provider's key set is fetched on first use and cached until its TTL
//! runs out: the response's `Cache-Control: max-age` if present, else the
//! configured default. At most one fetch per provider is in flight; tasks
//! that arrive while a fetch is running wait for it and reuse its result.
//!
//! A forced refresh bypasses the TTL, but runs at most once per
//! [`MIN_FORCED_REFRESH_INTERVAL`] per provider so that tokens naming unknown
//! keys cannot turn into an outbound request each.

use gatehouse_platform_access::{ProviderId, TokenRejection};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::provider_client::ProviderClient;

/// Upper bound on a cached key set's lifetime, whatever `max-age` says.
const MAX_KEY_SET_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum time between two forced refreshes of the same provider's set.
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// A JSON Web Key Set document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// One entry of a key set. Only the fields needed for RS256 are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

/// RSA public key components, base64url-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    n: String,
    e: String,
}

impl RsaKey {
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_components(&self.n, &self.e)
    }
}

/// The RS256 signing keys usable from one provider's key set.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keyed: HashMap<String, RsaKey>,
    unkeyed: Vec<RsaKey>,
}

impl KeySet {
    /// Keeps RSA signature keys; drops encryption keys, other key types and
    /// keys declaring an algorithm other than RS256.
    #[must_use]
    pub fn from_document(document: JwkSet) -> Self {
        let mut keys = Self::default();
        for jwk in document.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let Some(alg) = jwk.alg.as_deref()
                && alg != "RS256"
            {
                continue;
            }
            if let Some(key_use) = jwk.key_use.as_deref()
                && key_use != "sig"
            {
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n, jwk.e) else {
                continue;
            };
            if n.trim().is_empty() || e.trim().is_empty() {
                continue;
            }

            let key = RsaKey { n, e };
            match jwk.kid {
                Some(kid) if !kid.trim().is_empty() => {
                    keys.keyed.insert(kid, key);
                }
                _ => keys.unkeyed.push(key),
            }
        }
        keys
    }

    /// Finds the key for a token's `kid`. A token without `kid` matches
    /// only when the set holds exactly one key.
    #[must_use]
    pub fn lookup(&self, kid: Option<&str>) -> Option<&RsaKey> {
        match kid {
            Some(kid) => self.keyed.get(kid),
            None if self.len() == 1 => self.unkeyed.first().or_else(|| self.keyed.values().next()),
            None => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keyed.len() + self.unkeyed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry {
    keys: Arc<KeySet>,
    expires_at: Instant,
    /// Set when the entry came from a forced refresh.
    refreshed_at: Option<Instant>,
}

/// Per-provider key set cache shared by all requests.
pub struct KeySetCache {
    client: Arc<dyn ProviderClient>,
    default_ttl: Duration,
    entries: RwLock<HashMap<ProviderId, CacheEntry>>,
    refresh_locks: std::sync::Mutex<HashMap<ProviderId, Arc<Mutex<()>>>>,
}

impl KeySetCache {
    #[must_use]
    pub fn new(client: Arc<dyn ProviderClient>, default_ttl: Duration) -> Self {
        Self {
            client,
            default_ttl,
            entries: RwLock::new(HashMap::new()),
            refresh_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns the provider's key set, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if a needed fetch fails.
    pub async fn get(
        &self,
        provider: ProviderId,
        jwks_uri: &str,
    ) -> Result<Arc<KeySet>, TokenRejection> {
        if let Some(keys) = self.fresh(provider).await {
            return Ok(keys);
        }

        let lock = self.refresh_lock(provider);
        let _guard = lock.lock().await;
        // Another task may have refreshed while this one waited.
        if let Some(keys) = self.fresh(provider).await {
            return Ok(keys);
        }
        debug!(%provider, "fetching provider key set");
        self.fetch(provider, jwks_uri, false).await
    }

    /// Refetches the key set regardless of its TTL.
    ///
    /// `seen` is the set the caller found wanting. If the cache already holds
    /// a different set, another task refreshed in the meantime and that set is
    /// returned without a second fetch. A set fetched by a forced refresh
    /// less than [`MIN_FORCED_REFRESH_INTERVAL`] ago is also returned as is.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if the fetch fails.
    pub async fn refresh(
        &self,
        provider: ProviderId,
        jwks_uri: &str,
        seen: Option<&Arc<KeySet>>,
    ) -> Result<Arc<KeySet>, TokenRejection> {
        let lock = self.refresh_lock(provider);
        let _guard = lock.lock().await;
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&provider) {
                if seen.is_some_and(|seen| !Arc::ptr_eq(&entry.keys, seen)) {
                    return Ok(Arc::clone(&entry.keys));
                }
                if entry
                    .refreshed_at
                    .is_some_and(|at| at.elapsed() < MIN_FORCED_REFRESH_INTERVAL)
                {
                    debug!(%provider, "provider key set was force-refreshed recently; reusing it");
                    return Ok(Arc::clone(&entry.keys));
                }
            }
        }
        info!(%provider, "forcing provider key set refresh");
        self.fetch(provider, jwks_uri, true).await
    }

    async fn fresh(&self, provider: ProviderId) -> Option<Arc<KeySet>> {
        let entries = self.entries.read().await;
        entries
            .get(&provider)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| Arc::clone(&entry.keys))
    }

    fn refresh_lock(&self, provider: ProviderId) -> Arc<Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(provider).or_default())
    }

    async fn fetch(
        &self,
        provider: ProviderId,
        jwks_uri: &str,
        forced: bool,
    ) -> Result<Arc<KeySet>, TokenRejection> {
        let fetched = self.client.fetch_key_set(jwks_uri).await.map_err(|e| {
            warn!(%provider, error = %e, "failed to fetch provider key set");
            TokenRejection::KeySetUnavailable {
                reason: e.to_string(),
            }
        })?;

        let keys = KeySet::from_document(fetched.document);
        if keys.is_empty() {
            warn!(%provider, "provider key set has no usable RSA signing keys");
            return Err(TokenRejection::KeySetUnavailable {
                reason: "no usable RSA signing keys".to_string(),
            });
        }

        let ttl = fetched
            .max_age
            .unwrap_or(self.default_ttl)
            .min(MAX_KEY_SET_TTL);
        let keys = Arc::new(keys);
        let now = Instant::now();
        self.entries.write().await.insert(
            provider,
            CacheEntry {
                keys: Arc::clone(&keys),
                expires_at: now + ttl,
                refreshed_at: forced.then_some(now),
            },
        );
        debug!(%provider, keys = keys.len(), ttl_seconds = ttl.as_secs(), "cached provider key set");
        Ok(keys)
    }
}

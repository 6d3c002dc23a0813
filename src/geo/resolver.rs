//! TTL-caching country resolver
//!
//! Wraps a `GeoLookup` with an in-memory cache keyed by origin.
//!
//! ## Rules
//!
//! - Loopback and private-range origins resolve to `LOCAL` without a call
//! - A fresh cache entry (younger than the TTL) is served as-is
//! - A miss issues exactly one external call, bounded by a timeout
//! - Successes are cached; failures are not, so a transient outage does not
//!   poison later lookups
//! - Concurrent misses for the same origin may both call out; last write wins
//!
//! The cache is never persisted. Entries use `tokio::time::Instant` so tests
//! can advance a paused clock past the TTL.

use super::traits::{GeoError, GeoLookup};
use crate::identity::{Origin, LOCAL_COUNTRY};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default cache TTL (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default bound on a single external lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedCountry {
    country_code: String,
    inserted_at: Instant,
}

impl CachedCountry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() <= ttl
    }
}

/// Caching front for a `GeoLookup`.
pub struct GeoResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: Mutex<HashMap<String, CachedCountry>>,
    ttl: Duration,
    timeout: Duration,
}

impl GeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            lookup,
            cache: Mutex::new(HashMap::new()),
            ttl,
            timeout,
        }
    }

    /// Resolver with the default TTL and lookup timeout.
    pub fn with_defaults(lookup: Arc<dyn GeoLookup>) -> Self {
        Self::new(lookup, DEFAULT_TTL, DEFAULT_LOOKUP_TIMEOUT)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the country code of `origin`, or `None` on any failure.
    pub async fn country_of(&self, origin: &Origin) -> Option<String> {
        if origin.is_local() {
            return Some(LOCAL_COUNTRY.to_string());
        }

        if let Some(code) = self.cached_country(origin) {
            debug!(origin = %origin, country = %code, "country served from cache");
            return Some(code);
        }

        let outcome = tokio::time::timeout(self.timeout, self.lookup.country_code(origin.as_str()))
            .await
            .unwrap_or(Err(GeoError::Timeout));

        match outcome {
            Ok(code) => {
                info!(origin = %origin, country = %code, "country detected");
                self.lock().insert(
                    origin.as_str().to_string(),
                    CachedCountry {
                        country_code: code.clone(),
                        inserted_at: Instant::now(),
                    },
                );
                Some(code)
            }
            Err(e) => {
                warn!(origin = %origin, error = %e, "geolocation lookup failed");
                None
            }
        }
    }

    /// Deferred form of `country_of`, running on the current tokio runtime.
    ///
    /// The handle may be dropped; the task still completes and fills the
    /// cache.
    pub fn spawn_country_of(self: &Arc<Self>, origin: Origin) -> JoinHandle<Option<String>> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move { resolver.country_of(&origin).await })
    }

    /// Fresh cached value for `origin`, without any external call.
    ///
    /// Local origins answer `LOCAL`. Stale entries are treated as absent.
    pub fn cached_country(&self, origin: &Origin) -> Option<String> {
        if origin.is_local() {
            return Some(LOCAL_COUNTRY.to_string());
        }

        self.lock()
            .get(origin.as_str())
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.country_code.clone())
    }

    /// Drop every entry older than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut cache = self.lock();
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh(self.ttl));
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!(evicted, "expired geo cache entries evicted");
        }
        evicted
    }

    /// Number of entries currently held (fresh or stale).
    pub fn cache_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedCountry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

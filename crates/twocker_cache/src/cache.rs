//! TTL cache implementation.

use crate::stats::{CacheStats, Counters};
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with value and expiration.
#[derive(Debug, Clone, Getters)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let stored_at = Instant::now();
        Self {
            value,
            stored_at,
            expires_at: stored_at + ttl,
        }
    }

    /// Check if this entry is expired.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Get remaining time until expiration.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }
}

/// Configuration for a TTL cache.
#[derive(
    Debug,
    Clone,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
pub struct TtlCacheConfig {
    /// Lifetime of a stored value (seconds)
    #[serde(default = "default_ttl")]
    #[builder(default = "default_ttl()")]
    ttl_secs: u64,

    /// Maximum number of live entries
    #[serde(default = "default_max_size")]
    #[builder(default = "default_max_size()")]
    max_size: usize,
}

fn default_ttl() -> u64 {
    300 // 5 minutes
}

fn default_max_size() -> usize {
    1000
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_size: default_max_size(),
        }
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Keyed cache whose entries expire a fixed time after they are stored.
///
/// Lookups go through [`TtlCache::get_or_fetch`]. A live entry is returned
/// without calling the fetcher. Otherwise exactly one caller per key runs the
/// fetcher, and concurrent callers for that key wait for it and read the
/// stored result. Errors are handed back to the caller and never stored.
///
/// Every lookup counts as exactly one hit or one miss.
///
/// # Example
///
/// ```
/// use twocker_cache::{TtlCache, TtlCacheConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: TtlCache<String, bool> = TtlCache::new("live_status", &TtlCacheConfig::default());
///
/// let live = cache
///     .get_or_fetch("somechannel".to_string(), || async { Ok::<_, String>(true) })
///     .await;
/// assert_eq!(live, Ok(true));
/// assert_eq!(*cache.stats().misses(), 1);
/// # }
/// ```
pub struct TtlCache<K, V> {
    name: String,
    ttl: Duration,
    max_size: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<K, Gate>>,
    counters: Counters,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create a new cache with configuration.
    pub fn new(name: impl Into<String>, config: &TtlCacheConfig) -> Self {
        let name = name.into();
        tracing::debug!(
            cache = %name,
            ttl_secs = config.ttl_secs,
            max_size = config.max_size,
            "Creating new TtlCache"
        );
        Self {
            name,
            ttl: Duration::from_secs(config.ttl_secs),
            max_size: config.max_size.max(1),
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Name used in logs and stats.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifetime of stored values.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live value for `key`, fetching and storing it on a miss.
    #[tracing::instrument(skip(self, fetch), fields(cache = %self.name))]
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(&key) {
            self.counters.hit();
            tracing::trace!("Cache hit");
            return Ok(value);
        }

        let flight = InFlight::join(self, &key);
        let _permit = flight.gate.clone().lock_owned().await;

        // Another caller may have stored the value while we waited.
        if let Some(value) = self.lookup(&key) {
            self.counters.hit();
            tracing::trace!("Cache hit after in-flight fetch");
            return Ok(value);
        }

        self.counters.miss();
        tracing::debug!("Cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                self.store(key, value.clone());
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("Fetch failed, nothing stored");
                Err(e)
            }
        }
    }

    /// Read a live value, counting the hit or miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key);
        if found.is_some() {
            self.counters.hit();
        } else {
            self.counters.miss();
        }
        found
    }

    /// Store a value directly, replacing any existing entry.
    pub fn insert(&self, key: K, value: V) {
        self.store(key, value);
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove expired entries and return how many were dropped.
    #[tracing::instrument(skip(self), fields(cache = %self.name))]
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Swept expired entries");
        }
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current hit/miss counters and live population.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            entries.retain(|_, entry| !entry.is_expired());
            if entries.len() >= self.max_size {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    tracing::debug!(cache = %self.name, evicted = ?oldest, "Cache full, evicting");
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, CacheEntry::new(value, self.ttl));
    }
}

/// Membership in the set of callers working on one key.
///
/// Dropping the last member removes the gate so the in-flight map does not
/// grow with every key ever fetched.
struct InFlight<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    cache: &'a TtlCache<K, V>,
    key: K,
    gate: Gate,
}

impl<'a, K, V> InFlight<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    fn join(cache: &'a TtlCache<K, V>, key: &K) -> Self {
        let gate = cache
            .in_flight
            .lock()
            .entry(key.clone())
            .or_default()
            .clone();
        Self {
            cache,
            key: key.clone(),
            gate,
        }
    }
}

impl<K, V> Drop for InFlight<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        // One reference in the map, one here: nobody else is waiting.
        if let Some(existing) = in_flight.get(&self.key)
            && Arc::ptr_eq(existing, &self.gate)
            && Arc::strong_count(&self.gate) == 2
        {
            in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> TtlCache<String, u32> {
        TtlCache::new("test", &TtlCacheConfig::default().with_ttl_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_gate_released() {
        let cache = cache(60);
        let _ = cache
            .get_or_fetch("a".to_string(), || async { Ok::<_, ()>(1) })
            .await;
        assert!(cache.in_flight.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_at_capacity() {
        let config = TtlCacheConfig::default()
            .with_ttl_secs(60)
            .with_max_size(2);
        let cache: TtlCache<String, u32> = TtlCache::new("small", &config);
        cache.insert("a".into(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"a".to_string()).is_none());
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_remaining() {
        let cache = cache(300);
        cache.insert("a".into(), 1);
        tokio::time::advance(Duration::from_secs(100)).await;
        let entries = cache.entries.lock();
        let entry = entries.get("a").expect("entry");
        assert_eq!(entry.time_remaining(), Some(Duration::from_secs(200)));
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = TtlCacheConfigBuilder::default()
            .ttl_secs(60)
            .build()
            .expect("valid config");
        assert_eq!(*config.ttl_secs(), 60);
        assert_eq!(*config.max_size(), 1000);
    }
}

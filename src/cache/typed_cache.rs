//! Generic concurrent key/value cache with single-flight computation

use super::claim::Claim;
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::core::{PipelineError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A thread-safe map from `K` to `V`.
///
/// Readers share a reader/writer lock and never observe a half-applied write;
/// writers are exclusive and the last write for a key wins. Entries never
/// expire on their own.
///
/// [`get_or_compute`](Self::get_or_compute) additionally guarantees that at
/// most one computation per key is in flight, no matter how many callers race
/// on that key.
///
/// # Example
///
/// ```rust
/// use rust_cache_pool::TypedCache;
///
/// let cache: TypedCache<&str, u32> = TypedCache::new();
/// cache.put("answer", 42);
/// assert_eq!(cache.get(&"answer"), Some(42));
///
/// cache.delete(&"answer");
/// assert_eq!(cache.get(&"answer"), None);
/// ```
pub struct TypedCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
    // Lock order: `claims` before `entries`. Never acquire `claims` while
    // holding `entries`.
    claims: Mutex<HashMap<K, Arc<Claim<V>>>>,
    stats: CacheStats,
}

impl<K, V> fmt::Debug for TypedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Each guard is released before the next lock is taken
        let in_flight = self.claims.lock().len();
        let len = self.entries.read().len();
        f.debug_struct("TypedCache")
            .field("len", &len)
            .field("in_flight", &in_flight)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<K, V> Default for TypedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty cache with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            claims: Mutex::new(HashMap::new()),
            stats: CacheStats::new(),
        }
    }

    /// Look up `key`. Returns `None` if absent; never has side effects on the map.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.entries.read().get(key).cloned();
        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    /// Insert or overwrite the value for `key`
    pub fn put(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Remove `key`. No-op if absent.
    pub fn delete(&self, key: &K) {
        self.entries.write().remove(key);
    }

    /// Whether `key` currently has a value
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of entries. Under concurrent writers this may be stale as soon
    /// as it returns.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the keys currently present, in no particular order
    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    /// Remove every entry. In-flight computations still install their result.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Snapshot of hit/miss/computation counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Return the value for `key`, computing and installing it if absent.
    ///
    /// If the key is present, `compute` is not called. Otherwise the first
    /// caller to miss claims the key and runs `compute` without holding any
    /// cache lock, so `compute` may be slow or read and write *other* keys.
    /// Concurrent callers for the same key block until the claim resolves and
    /// receive the same value.
    ///
    /// If `compute` fails, nothing is cached and every caller sharing the
    /// claim gets [`PipelineError::ComputeFailed`]; the next caller retries.
    /// If `compute` panics, waiters get `ComputeFailed` and the panic
    /// continues in the claiming caller.
    ///
    /// `compute` must not request its own key; that caller would wait on its
    /// own claim forever.
    ///
    /// ```rust
    /// use rust_cache_pool::TypedCache;
    ///
    /// let cache: TypedCache<String, usize> = TypedCache::new();
    /// let len = cache
    ///     .get_or_compute("hello".to_string(), || Ok::<_, String>("hello".len()))
    ///     .unwrap();
    /// assert_eq!(len, 5);
    ///
    /// // Cached: the second compute is never invoked
    /// let len = cache
    ///     .get_or_compute("hello".to_string(), || Err("unreachable"))
    ///     .unwrap();
    /// assert_eq!(len, 5);
    /// ```
    pub fn get_or_compute<F, E>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: fmt::Display,
    {
        if let Some(value) = self.entries.read().get(&key).cloned() {
            self.stats.record_hit();
            return Ok(value);
        }

        let claim = {
            let mut claims = self.claims.lock();

            // A claimer installs its value before dropping its claim, so a
            // value missing here with no claim means nobody is computing it.
            if let Some(value) = self.entries.read().get(&key).cloned() {
                self.stats.record_hit();
                return Ok(value);
            }

            match claims.get(&key) {
                Some(existing) => ClaimRole::Waiter(Arc::clone(existing)),
                None => {
                    let claim = Arc::new(Claim::new());
                    claims.insert(key.clone(), Arc::clone(&claim));
                    ClaimRole::Owner(claim)
                }
            }
        };

        match claim {
            ClaimRole::Waiter(claim) => {
                self.stats.record_coalesced();
                log::trace!("waiting on in-flight computation");
                claim.wait()
            }
            ClaimRole::Owner(claim) => {
                self.stats.record_miss();
                self.stats.record_computation();
                log::trace!("claimed key for computation");

                let guard = ClaimGuard {
                    cache: self,
                    key: Some(key),
                    claim,
                };

                match compute() {
                    Ok(value) => {
                        guard.install(value.clone());
                        Ok(value)
                    }
                    Err(e) => {
                        let err = PipelineError::compute_failed(e.to_string());
                        log::debug!("computation failed: {}", e);
                        guard.abandon(err.clone());
                        Err(err)
                    }
                }
            }
        }
    }

    fn release_claim(&self, key: &K) {
        self.claims.lock().remove(key);
    }
}

enum ClaimRole<V> {
    Owner(Arc<Claim<V>>),
    Waiter(Arc<Claim<V>>),
}

/// Held by the claiming caller while its compute runs. Dropping it without
/// resolving (i.e. during a panic) releases the claim with a failure.
struct ClaimGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    cache: &'a TypedCache<K, V>,
    key: Option<K>,
    claim: Arc<Claim<V>>,
}

impl<K, V> ClaimGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn install(mut self, value: V) {
        if let Some(key) = self.key.take() {
            self.cache.entries.write().insert(key.clone(), value.clone());
            self.cache.release_claim(&key);
        }
        self.claim.complete(Ok(value));
    }

    fn abandon(mut self, err: PipelineError) {
        self.cache.stats.record_compute_failure();
        if let Some(key) = self.key.take() {
            self.cache.release_claim(&key);
        }
        self.claim.complete(Err(err));
    }
}

impl<K, V> Drop for ClaimGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            log::error!("computation panicked, releasing claim");
            self.cache.stats.record_compute_failure();
            self.cache.release_claim(&key);
            self.claim
                .complete(Err(PipelineError::compute_failed("computation panicked")));
        }
    }
}

//! In-memory TTL cache with atomic per-key increment and swap.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::backends::FastCache;
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

const NUM_SHARDS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    value: i64,
    /// Epoch-millisecond expiry; `None` never expires.
    expires_at: Option<u64>,
}

/// In-memory [`FastCache`] sharded across cache-line-padded locks.
///
/// Keys hash to one of 16 shards, each behind its own padded mutex, so
/// concurrent increments of unrelated counters rarely contend on the same
/// lock (or the same cache line). Per-key operations hold exactly one
/// shard lock, which is what makes `incr` and `swap` atomic with respect
/// to each other.
///
/// Expiry is lazy: an entry past its deadline is dropped by whichever
/// operation touches it next. Tests can also drop entries explicitly with
/// [`evict`](MemoryCache::evict) to exercise the undercount path, or take
/// the whole cache down with [`set_offline`](MemoryCache::set_offline).
pub struct MemoryCache {
    shards: Vec<CachePadded<Mutex<HashMap<String, CacheEntry>>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    offline: AtomicBool,
}

impl MemoryCache {
    /// Creates a cache on the system clock with no default expiry.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS)
                .map(|_| CachePadded::new(Mutex::new(HashMap::new())))
                .collect(),
            clock: Arc::new(SystemClock),
            default_ttl: Duration::ZERO,
            offline: AtomicBool::new(false),
        }
    }

    /// Replaces the time source (tests pair this with `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the TTL applied to entries created by [`FastCache::incr`].
    ///
    /// Zero (the default) means such entries never expire on their own.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Simulates a cache outage: while offline, every operation returns
    /// [`CacheError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Drops a single entry, as capacity eviction would.
    pub fn evict(&self, key: &str) {
        self.shard(key).remove(key);
    }

    fn shard(&self, key: &str) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % NUM_SHARDS;
        self.shards[idx].lock().expect("cache lock poisoned")
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("cache offline".into()))
        } else {
            Ok(())
        }
    }

    fn expiry_from(&self, ttl: Duration) -> Option<u64> {
        if ttl.is_zero() {
            None
        } else {
            Some(self.clock.now_millis() + ttl.as_millis() as u64)
        }
    }

    /// Reads a live entry out of a locked shard, dropping it when expired.
    fn live_entry(
        shard: &mut HashMap<String, CacheEntry>,
        key: &str,
        now: u64,
    ) -> Option<CacheEntry> {
        let entry = shard.get(key).copied()?;
        if entry.expires_at.is_some_and(|at| at <= now) {
            shard.remove(key);
            return None;
        }
        Some(entry)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries: usize = self
            .shards
            .iter()
            .map(|s| s.lock().expect("cache lock poisoned").len())
            .sum();
        f.debug_struct("MemoryCache")
            .field("entries", &entries)
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl FastCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.check_online()?;
        let now = self.clock.now_millis();
        let mut shard = self.shard(key);
        Ok(Self::live_entry(&mut shard, key, now).map(|e| e.value))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<i64>>, CacheError> {
        self.check_online()?;
        let now = self.clock.now_millis();
        Ok(keys
            .iter()
            .map(|key| {
                let mut shard = self.shard(key);
                Self::live_entry(&mut shard, key, now).map(|e| e.value)
            })
            .collect())
    }

    fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CacheError> {
        self.check_online()?;
        let expires_at = self.expiry_from(ttl);
        self.shard(key)
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check_online()?;
        let now = self.clock.now_millis();
        let default_expiry = self.expiry_from(self.default_ttl);
        let mut shard = self.shard(key);
        let next = match Self::live_entry(&mut shard, key, now) {
            Some(entry) => CacheEntry {
                value: entry.value.wrapping_add(delta),
                expires_at: entry.expires_at,
            },
            None => CacheEntry {
                value: delta,
                expires_at: default_expiry,
            },
        };
        shard.insert(key.to_string(), next);
        Ok(next.value)
    }

    fn swap(&self, key: &str, new_value: i64) -> Result<Option<i64>, CacheError> {
        self.check_online()?;
        let now = self.clock.now_millis();
        let mut shard = self.shard(key);
        match Self::live_entry(&mut shard, key, now) {
            Some(entry) => {
                shard.insert(
                    key.to_string(),
                    CacheEntry {
                        value: new_value,
                        expires_at: entry.expires_at,
                    },
                );
                Ok(Some(entry.value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    #[test]
    fn test_incr_creates_at_delta() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("k", 7).unwrap(), 7);
        assert_eq!(cache.incr("k", -2).unwrap(), 5);
        assert_eq!(cache.get("k").unwrap(), Some(5));
    }

    #[test]
    fn test_swap_returns_old_value() {
        let cache = MemoryCache::new();
        cache.incr("k", 42).unwrap();
        assert_eq!(cache.swap("k", 0).unwrap(), Some(42));
        assert_eq!(cache.get("k").unwrap(), Some(0));
    }

    #[test]
    fn test_swap_absent_does_not_create() {
        let cache = MemoryCache::new();
        assert_eq!(cache.swap("ghost", 0).unwrap(), None);
        assert_eq!(cache.get("ghost").unwrap(), None);
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new();
        cache.set("stamp", 123, Duration::ZERO).unwrap();
        assert_eq!(cache.get("stamp").unwrap(), Some(123));
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::new().with_clock(clock.clone());
        cache.set("k", 1, Duration::from_secs(10)).unwrap();

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get("k").unwrap(), Some(1));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_default_ttl_applies_to_incr() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::new()
            .with_clock(clock.clone())
            .with_default_ttl(Duration::from_secs(5));
        cache.incr("k", 3).unwrap();

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.swap("k", 0).unwrap(), None);
    }

    #[test]
    fn test_expired_entry_recreated_by_incr() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::new()
            .with_clock(clock.clone())
            .with_default_ttl(Duration::from_secs(5));
        cache.incr("k", 10).unwrap();
        clock.advance(Duration::from_secs(6));
        // The old value is gone; the increment starts a fresh entry.
        assert_eq!(cache.incr("k", 1).unwrap(), 1);
    }

    #[test]
    fn test_get_many_order_and_duplicates() {
        let cache = MemoryCache::new();
        cache.incr("a", 1).unwrap();
        cache.incr("c", 3).unwrap();
        let keys: Vec<String> = ["a", "b", "a", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            cache.get_many(&keys).unwrap(),
            vec![Some(1), None, Some(1), Some(3)]
        );
    }

    #[test]
    fn test_evict_drops_entry() {
        let cache = MemoryCache::new();
        cache.incr("k", 9).unwrap();
        cache.evict("k");
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_offline() {
        let cache = MemoryCache::new();
        cache.set_offline(true);
        assert!(cache.incr("k", 1).is_err());
        assert!(cache.get("k").is_err());
        cache.set_offline(false);
        assert_eq!(cache.incr("k", 1).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_incr_exact() {
        let cache = Arc::new(MemoryCache::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    cache.incr("shared", 1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.get("shared").unwrap(), Some(8000));
    }
}

//! The counter engine: buffered increments, batched reads, transactional flush.
//!
//! # Data flow
//!
//! ```text
//!  incr ──atomic add──►  FastCache["ctr_val:<name>"]        (buffered delta)
//!    │
//!    └─ stamp stale? ──►  FlushDispatcher::schedule(name)   (coalesced)
//!                                   │
//!                                   ▼
//!  flush ──atomic swap(0)── FastCache["ctr_val:<name>"]
//!    │
//!    └─ delta ≠ 0 ──txn read/add/commit──► DurableStore[name]
//!                └─ best-effort ──► FastCache["ctr_ts:<name>"] = now
//!
//!  get_count(s) = DurableStore.read_many + FastCache.get_many, summed
//! ```
//!
//! # Consistency
//!
//! `true_value = persisted_value + pending_delta` holds at any instant,
//! except that a buffered delta can be lost to cache eviction before a
//! flush drains it. The design accepts that bounded *undercount* in
//! exchange for a durable write per interval instead of per increment;
//! it never overcounts, because a delta leaves the cache only through
//! the atomic swap that hands it to exactly one flush attempt.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backends::{DurableStore, FastCache, FlushDispatcher, FlushHandler};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{CounterError, StoreError};

/// Cache key holding a counter's buffered delta.
const DELTA_KEY_PREFIX: &str = "ctr_val:";
/// Cache key holding a counter's last-flush stamp (epoch millis).
const STAMP_KEY_PREFIX: &str = "ctr_ts:";

fn delta_key(name: &str) -> String {
    format!("{DELTA_KEY_PREFIX}{name}")
}

fn stamp_key(name: &str) -> String {
    format!("{STAMP_KEY_PREFIX}{name}")
}

/// Write-buffered counter engine over a durable store, a fast cache, and
/// a deferred-flush dispatcher.
///
/// The engine holds no per-counter state and takes no in-process locks:
/// all shared mutable state lives in the backends, which are already
/// concurrent-safe. One engine instance is constructed at process start
/// and shared by reference across request handlers.
///
/// # Examples
///
/// ```rust
/// use contabile::backends::{MemoryCache, MemoryStore, WorkerDispatcher};
/// use contabile::engine::CounterEngine;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let cache = Arc::new(MemoryCache::new());
/// let dispatcher = Arc::new(WorkerDispatcher::new());
///
/// let engine = CounterEngine::new(store, cache, dispatcher);
/// engine.incr("page_views").unwrap();
/// engine.incr_by("page_views", 41).unwrap();
///
/// assert_eq!(engine.get_count("page_views").unwrap(), 42);
///
/// engine.flush("page_views").unwrap();
/// assert_eq!(engine.get_count("page_views").unwrap(), 42);
/// ```
pub struct CounterEngine {
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn FastCache>,
    dispatcher: Arc<dyn FlushDispatcher>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl CounterEngine {
    /// Creates an engine with the default [`EngineConfig`] and the system
    /// clock.
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn FastCache>,
        dispatcher: Arc<dyn FlushDispatcher>,
    ) -> Self {
        Self {
            store,
            cache,
            dispatcher,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// Replaces the configuration, returning `self` for chaining.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the time source, returning `self` for chaining.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increments a counter by 1.
    ///
    /// Equivalent to [`incr_by`](Self::incr_by) with delta 1.
    pub fn incr(&self, name: &str) -> Result<(), CounterError> {
        self.incr_with(name, 1, self.config.update_interval)
    }

    /// Adds `delta` (which may be negative) to a counter.
    ///
    /// Uses the engine-wide update interval from [`EngineConfig`].
    pub fn incr_by(&self, name: &str, delta: i64) -> Result<(), CounterError> {
        self.incr_with(name, delta, self.config.update_interval)
    }

    /// Adds `delta` to a counter with an explicit flush throttle interval.
    ///
    /// The increment lands in the shared cache via an atomic per-key add;
    /// a durable flush is only *scheduled*, and only when the counter's
    /// last flush is at least `update_interval` old (no stamp means
    /// "flush now"). Repeated calls within the interval ride on the
    /// dispatcher's coalescing instead of enqueuing duplicate jobs.
    ///
    /// A zero `update_interval` switches to write-through: the buffered
    /// delta is flushed synchronously before this call returns.
    ///
    /// Cache and dispatcher failures are absorbed (logged, increment
    /// dropped or durability deferred, respectively); by contract this
    /// operation does not fail the caller for a degraded backend.
    pub fn incr_with(
        &self,
        name: &str,
        delta: i64,
        update_interval: Duration,
    ) -> Result<(), CounterError> {
        if update_interval.is_zero() {
            return self.write_through(name, delta);
        }

        if let Err(err) = self.cache.incr(&delta_key(name), delta) {
            warn!(counter = name, delta, error = %err, "cache increment failed; increment dropped");
            return Ok(());
        }

        if self.flush_due(name, update_interval) {
            if let Err(err) = self.dispatcher.schedule(name) {
                debug!(counter = name, error = %err, "flush scheduling failed; deferred to a later increment");
            }
        }
        Ok(())
    }

    /// Returns a counter's current value: durable base plus buffered delta.
    ///
    /// Counters never incremented read 0. Fails only when the durable
    /// store is unreachable; a cache outage degrades to the durable base.
    pub fn get_count(&self, name: &str) -> Result<i64, CounterError> {
        Ok(self.get_counts(&[name])?[0])
    }

    /// Returns the current values of many counters in input order.
    ///
    /// Issues exactly one batched store read and one batched cache read
    /// regardless of how many names are passed; the point of the bulk
    /// API is amortizing round trips. Duplicate names yield duplicate,
    /// consistent results.
    pub fn get_counts(&self, names: &[&str]) -> Result<Vec<i64>, CounterError> {
        let bases = self
            .store
            .read_many(names)
            .map_err(|err| CounterError::StoreUnavailable(err.to_string()))?;

        let keys: Vec<String> = names.iter().map(|name| delta_key(name)).collect();
        let deltas = match self.cache.get_many(&keys) {
            Ok(deltas) => deltas,
            Err(err) => {
                // Reads fail open toward the durable base; the cache must
                // never block them.
                warn!(error = %err, "cache read failed; buffered deltas read as zero");
                vec![None; names.len()]
            }
        };

        Ok(bases
            .into_iter()
            .zip(deltas)
            .map(|(base, delta)| base.unwrap_or(0).wrapping_add(delta.unwrap_or(0)))
            .collect())
    }

    /// Drains a counter's buffered delta into the durable store.
    ///
    /// Invoked by the dispatcher for scheduled jobs; also public for
    /// write-through mode, graceful shutdown, and tests. Returns the
    /// committed delta, 0 when there was nothing to flush.
    ///
    /// The operation is idempotent and safe to race with itself: the
    /// buffered delta is taken with an atomic swap-to-zero, so a
    /// duplicate invocation observes 0 and becomes a no-op. A delta
    /// whose commit ultimately fails is dropped, not re-injected into
    /// the cache: re-injection could double-count against a concurrent
    /// increment, and undercounting is the accepted failure direction.
    pub fn flush(&self, name: &str) -> Result<i64, CounterError> {
        let delta = match self.cache.swap(&delta_key(name), 0) {
            Ok(Some(delta)) => delta,
            // Entry evicted between scheduling and running: nothing to do.
            Ok(None) => 0,
            Err(err) => {
                debug!(counter = name, error = %err, "cache drain failed; nothing flushed");
                0
            }
        };
        if delta == 0 {
            return Ok(0);
        }

        self.merge_into_store(name, delta)?;

        let now = self.clock.now_millis() as i64;
        if let Err(err) = self.cache.set(&stamp_key(name), now, self.config.stamp_ttl) {
            debug!(counter = name, error = %err, "flush stamp update failed");
        }
        debug!(counter = name, delta, "flushed buffered delta");
        Ok(delta)
    }

    /// Checks the cache-resident flush stamp against the throttle window.
    ///
    /// An absent or unreadable stamp means "flush immediately".
    fn flush_due(&self, name: &str, update_interval: Duration) -> bool {
        match self.cache.get(&stamp_key(name)) {
            Ok(Some(stamp)) => {
                let now = self.clock.now_millis() as i64;
                now.saturating_sub(stamp) >= update_interval.as_millis() as i64
            }
            Ok(None) => true,
            Err(_) => true,
        }
    }

    /// Write-through increment for a zero update interval.
    ///
    /// Still routes through the cache so the buffered invariant holds,
    /// but drains synchronously. With the cache down, falls back to
    /// merging the delta straight into the store. Both paths are
    /// best-effort: failures are logged, never raised.
    fn write_through(&self, name: &str, delta: i64) -> Result<(), CounterError> {
        match self.cache.incr(&delta_key(name), delta) {
            Ok(_) => {
                if let Err(err) = self.flush(name) {
                    warn!(counter = name, delta, error = %err, "write-through flush failed");
                }
            }
            Err(cache_err) => {
                debug!(counter = name, error = %cache_err, "cache down; committing increment directly");
                if let Err(err) = self.merge_into_store(name, delta) {
                    warn!(counter = name, delta, error = %err, "direct commit failed; increment dropped");
                }
            }
        }
        Ok(())
    }

    /// Transactionally adds `delta` to the counter's durable record,
    /// redoing the read-modify-write cycle on commit conflicts up to the
    /// configured retry budget.
    fn merge_into_store(&self, name: &str, delta: i64) -> Result<(), CounterError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.commit_once(name, delta) {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) if attempts <= self.config.flush_retries => continue,
                Err(StoreError::Conflict) => {
                    warn!(
                        counter = name,
                        delta, attempts, "flush abandoned after repeated conflicts; buffered delta dropped"
                    );
                    return Err(CounterError::FlushContention {
                        name: name.to_string(),
                        attempts,
                    });
                }
                Err(StoreError::Unavailable(reason)) => {
                    warn!(counter = name, delta, %reason, "store unavailable during flush; buffered delta dropped");
                    return Err(CounterError::StoreUnavailable(reason));
                }
            }
        }
    }

    fn commit_once(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        let mut txn = self.store.transaction(name)?;
        let base = txn.read()?;
        txn.write(base.wrapping_add(delta));
        txn.commit()
    }
}

impl std::fmt::Debug for CounterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FlushHandler for CounterEngine {
    /// Dispatcher entry point. Failures are logged, not propagated: the
    /// buffered delta (when still present) is re-attempted as soon as a
    /// later increment finds the flush stamp stale.
    fn run_flush(&self, name: &str) {
        if let Err(err) = self.flush(name) {
            warn!(counter = name, error = %err, "scheduled flush failed");
        }
    }
}

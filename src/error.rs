//! Error types for the engine and its backends.
//!
//! Each backend surfaces its own error enum; [`CounterError`] is the only
//! type callers of [`CounterEngine`](crate::engine::CounterEngine) see.
//! The engine deliberately absorbs most backend failures (a counter
//! service that fails a request because the cache hiccuped defeats its
//! own purpose), so the caller-facing surface is small:
//!
//! | Backend failure | Caller-visible outcome |
//! |-----------------|------------------------|
//! | Cache down during `incr` | `Ok(())`, increment dropped (logged) |
//! | Cache down during reads | `Ok(..)`, buffered deltas read as 0 |
//! | Store down during reads | `Err(StoreUnavailable)` |
//! | Store down during `flush` | `Err(StoreUnavailable)`, delta dropped |
//! | Commit conflicts exhaust the retry budget | `Err(FlushContention)`, delta dropped |
//! | Dispatcher down | `Ok(())`, flush deferred to a later increment |

use thiserror::Error;

/// Errors raised by a [`FastCache`](crate::backends::FastCache) backend.
///
/// The cache is best-effort by contract: the engine never propagates
/// these to callers, it degrades around them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`DurableStore`](crate::backends::DurableStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A transaction commit lost an optimistic-concurrency race.
    ///
    /// Safe to retry: the merge is a commutative addition, so redoing
    /// the read-modify-write cycle always produces a correct result.
    #[error("transaction commit conflict")]
    Conflict,
}

/// Errors raised by a [`FlushDispatcher`](crate::backends::FlushDispatcher) backend.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher could not accept the job.
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Caller-facing errors of the counter engine.
#[derive(Debug, Error)]
pub enum CounterError {
    /// The durable store was unreachable.
    ///
    /// Surfaced by reads (`get_count`/`get_counts`) and by `flush`.
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(String),

    /// A flush abandoned its transaction after repeated commit conflicts.
    ///
    /// The drained delta is dropped rather than re-injected into the
    /// cache; re-injection could double-count against a concurrent
    /// increment. This is the documented undercount boundary.
    #[error("flush of counter `{name}` abandoned after {attempts} conflicting commits")]
    FlushContention {
        /// The counter whose flush was abandoned.
        name: String,
        /// Number of commit attempts made before giving up.
        attempts: u32,
    },
}

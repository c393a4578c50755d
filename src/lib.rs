//! # Contabile - Write-Buffered Durable Counters
//!
//! A Rust library implementing the **write-behind counter pattern**:
//! increments land in a fast shared cache and are merged into durable
//! storage periodically and transactionally, instead of paying a durable
//! write per increment.
//!
//! ## The Problem
//!
//! A naive durable counter performs one transactional read-modify-write
//! per increment. Under real traffic that is a severe bottleneck: every
//! hot counter serializes all of its writers on a single storage record,
//! and the store absorbs write amplification proportional to request
//! volume rather than to the number of counters.
//!
//! ## The Solution: Buffer, Coalesce, Flush
//!
//! This library splits every counter into a durable base value and a
//! cache-resident buffered delta:
//!
//! 1. **Increments touch only the cache.** Each `incr` is one atomic
//!    per-key add against the shared cache, safe under concurrent
//!    callers across service instances.
//! 2. **Flushes are scheduled, throttled, and coalesced.** At most once
//!    per `update_interval`, an increment schedules a deferred flush job
//!    keyed by counter name; duplicate jobs collapse into one.
//! 3. **The flush drains atomically and commits transactionally.** The
//!    buffered delta is taken with an atomic swap-to-zero and added to
//!    the durable base inside a transaction, with bounded retry on
//!    commit conflicts.
//! 4. **Reads are batched.** `get_counts` fetches all durable bases in
//!    one round trip and all buffered deltas in another, whatever the
//!    number of counters requested.
//!
//! ### The Trade-off
//!
//! The cache is best-effort: a buffered delta evicted before its flush
//! is lost, so counts may **undercount** within a bounded window. They
//! never overcount: a delta leaves the cache only through the atomic
//! swap that hands it to exactly one flush. Workloads needing exact
//! counts under cache loss should set `update_interval` to zero and
//! accept a durable write per increment.
//!
//! ## Quick Start
//!
//! ```rust
//! use contabile::backends::{MemoryCache, MemoryStore, WorkerDispatcher};
//! use contabile::CounterEngine;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let cache = Arc::new(MemoryCache::new());
//! let dispatcher = Arc::new(WorkerDispatcher::new());
//!
//! let engine = CounterEngine::new(store, cache, dispatcher);
//!
//! engine.incr("page_views").unwrap();
//! engine.incr_by("page_views", 41).unwrap();
//!
//! // Reads combine the durable base with the buffered delta.
//! assert_eq!(engine.get_count("page_views").unwrap(), 42);
//!
//! // Drain the buffer into the durable store.
//! engine.flush("page_views").unwrap();
//! assert_eq!(engine.get_count("page_views").unwrap(), 42);
//! ```
//!
//! In production the engine does not flush itself: scheduled jobs are
//! delivered by the dispatcher. With the in-memory dispatcher that means
//! starting its worker once the engine exists:
//!
//! ```rust,no_run
//! # use contabile::backends::{MemoryCache, MemoryStore, WorkerDispatcher};
//! # use contabile::{CounterEngine, FlushHandler};
//! # use std::sync::Arc;
//! let dispatcher = Arc::new(WorkerDispatcher::new());
//! let engine = Arc::new(CounterEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryCache::new()),
//!     dispatcher.clone(),
//! ));
//!
//! let handler: Arc<dyn FlushHandler> = engine.clone();
//! dispatcher.start(&handler);
//! ```
//!
//! ## Architecture
//!
//! The engine holds no counter state and takes no in-process locks; all
//! shared mutable state lives behind three backend traits
//! ([`backends`]):
//!
//! | Backend | Holds | Contract |
//! |---------|-------|----------|
//! | [`DurableStore`] | persisted base values | transactional, serializable per key |
//! | [`FastCache`] | buffered deltas, flush stamps | atomic per key, may evict anytime |
//! | [`FlushDispatcher`] | scheduled flush jobs | at-least-once, coalesced per name |
//!
//! In-memory implementations of all three back the tests, the demo, and
//! the benches; production deployments implement the traits over their
//! actual storage, cache, and queue services.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`EngineConfig`] and [`snapshot`] types |
//! | `json` | JSON rendering of snapshots (implies `serde`) |
//! | `demo` | The `demo` example binary (clap + tracing-subscriber) |
//! | `full` | All of the above except `demo` |
//!
//! ## When to Use
//!
//! Use these counters when:
//! - Increment volume is much higher than what the durable store should
//!   absorb as individual writes
//! - Bounded staleness and rare bounded undercount are acceptable
//! - Multiple service instances update the same counters concurrently
//!
//! For low-volume counters, or where every single increment must survive
//! any failure, write through the store directly instead.

pub mod backends;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use backends::{DurableStore, FastCache, FlushDispatcher, FlushHandler, StoreTransaction};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::CounterEngine;
pub use error::{CacheError, CounterError, DispatchError, StoreError};

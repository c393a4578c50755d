//! In-memory durable store with optimistic per-record transactions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::backends::{DurableStore, StoreTransaction};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy)]
struct Record {
    value: i64,
    version: u64,
}

/// In-memory [`DurableStore`] with optimistic concurrency control.
///
/// Each record carries a version; a transaction snapshots the version at
/// read time and commits only if it is unchanged, otherwise the commit
/// fails with [`StoreError::Conflict`]. This models the
/// serializable-per-key contract real stores provide.
///
/// The store also carries fault-injection knobs used by the engine's
/// failure-path tests: [`set_offline`](MemoryStore::set_offline) makes
/// every operation fail, and [`force_conflicts`](MemoryStore::force_conflicts)
/// makes the next N commits conflict regardless of versions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    offline: AtomicBool,
    forced_conflicts: AtomicU32,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a store outage: while offline, every operation returns
    /// [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail with [`StoreError::Conflict`].
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Reads a record directly, bypassing the transactional path.
    ///
    /// Test-facing peek: lets assertions inspect what was durably
    /// committed without going through the engine's read path.
    pub fn persisted(&self, name: &str) -> Option<i64> {
        self.records
            .lock()
            .expect("store lock poisoned")
            .get(name)
            .map(|r| r.value)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".into()))
        } else {
            Ok(())
        }
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DurableStore for MemoryStore {
    fn transaction<'a>(&'a self, name: &str) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        self.check_online()?;
        Ok(Box::new(MemoryTransaction {
            store: self,
            name: name.to_string(),
            snapshot_version: None,
            staged: None,
        }))
    }

    fn read_many(&self, names: &[&str]) -> Result<Vec<Option<i64>>, StoreError> {
        self.check_online()?;
        let records = self.records.lock().expect("store lock poisoned");
        Ok(names
            .iter()
            .map(|name| records.get(*name).map(|r| r.value))
            .collect())
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    name: String,
    snapshot_version: Option<u64>,
    staged: Option<i64>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn read(&mut self) -> Result<i64, StoreError> {
        self.store.check_online()?;
        let records = self.store.records.lock().expect("store lock poisoned");
        let (value, version) = records
            .get(&self.name)
            .map(|r| (r.value, r.version))
            .unwrap_or((0, 0));
        self.snapshot_version = Some(version);
        Ok(value)
    }

    fn write(&mut self, value: i64) {
        self.staged = Some(value);
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.check_online()?;
        if self.store.take_forced_conflict() {
            return Err(StoreError::Conflict);
        }
        let Some(staged) = self.staged else {
            return Ok(());
        };
        let mut records = self.store.records.lock().expect("store lock poisoned");
        let current_version = records.get(&self.name).map(|r| r.version).unwrap_or(0);
        if self.snapshot_version != Some(current_version) {
            return Err(StoreError::Conflict);
        }
        records.insert(
            self.name,
            Record {
                value: staged,
                version: current_version + 1,
            },
        );
        Ok(())
    }
}

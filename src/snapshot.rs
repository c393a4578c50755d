//! Serializable point-in-time captures of counter values.
//!
//! A capture is a bulk read ([`CounterEngine::get_counts`]) frozen into a
//! plain serializable value, suitable for HTTP responses, files, or
//! inter-process hand-off.
//!
//! # Feature Flags
//!
//! This module requires the `serde` feature; JSON rendering additionally
//! requires `json`:
//!
//! ```toml
//! [dependencies]
//! contabile = { version = "0.2", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use contabile::snapshot::CountsSnapshot;
//!
//! let snapshot = CountsSnapshot::capture(&engine, &["page_views", "signups"])?;
//! let json = serde_json::to_string(&snapshot)?;
//! // {"counters":[{"name":"page_views","value":42},{"name":"signups","value":7}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::CounterEngine;
use crate::error::CounterError;

/// A single counter's captured value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// The counter's name.
    pub name: String,
    /// Durable base plus buffered delta at capture time.
    pub value: i64,
}

impl CounterSnapshot {
    /// Creates a snapshot from a name and value.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A point-in-time capture of many counters.
///
/// Values come from a single bulk read, so they are mutually consistent
/// to the extent the backends allow (bounded staleness, per the engine's
/// read contract).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountsSnapshot {
    /// Capture time in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The captured counters, in request order.
    pub counters: Vec<CounterSnapshot>,
}

impl CountsSnapshot {
    /// Builds a snapshot from already-fetched values.
    pub fn new(counters: Vec<CounterSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            counters,
        }
    }

    /// Attaches a capture timestamp.
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Captures the named counters through one bulk engine read.
    pub fn capture(engine: &CounterEngine, names: &[&str]) -> Result<Self, CounterError> {
        let values = engine.get_counts(names)?;
        Ok(Self::new(
            names
                .iter()
                .zip(values)
                .map(|(name, value)| CounterSnapshot::new(*name, value))
                .collect(),
        ))
    }

    /// Finds a captured counter by name (first match for duplicates).
    pub fn get(&self, name: &str) -> Option<&CounterSnapshot> {
        self.counters.iter().find(|c| c.name == name)
    }
}

/// Renders snapshots as JSON.
///
/// # Examples
///
/// ```rust,ignore
/// use contabile::snapshot::JsonObserver;
///
/// let json = JsonObserver::new().pretty(true).render(&snapshot)?;
/// println!("{json}");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObserver {
    pretty: bool,
}

#[cfg(feature = "json")]
impl JsonObserver {
    /// Creates an observer with compact output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Serializes a snapshot to a JSON string.
    pub fn render(&self, snapshot: &CountsSnapshot) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(snapshot)
        } else {
            serde_json::to_string(snapshot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryCache, MemoryStore, WorkerDispatcher};
    use std::sync::Arc;

    fn engine() -> CounterEngine {
        CounterEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(WorkerDispatcher::new()),
        )
    }

    #[test]
    fn test_capture_preserves_order() {
        let engine = engine();
        engine.incr_by("a", 1).unwrap();
        engine.incr_by("b", 2).unwrap();

        let snapshot = CountsSnapshot::capture(&engine, &["b", "a", "missing"]).unwrap();
        assert_eq!(snapshot.counters[0], CounterSnapshot::new("b", 2));
        assert_eq!(snapshot.counters[1], CounterSnapshot::new("a", 1));
        assert_eq!(snapshot.counters[2], CounterSnapshot::new("missing", 0));
    }

    #[test]
    fn test_get_by_name() {
        let snapshot = CountsSnapshot::new(vec![
            CounterSnapshot::new("foo", 1),
            CounterSnapshot::new("bar", -2),
        ]);
        assert_eq!(snapshot.get("bar").unwrap().value, -2);
        assert!(snapshot.get("baz").is_none());
    }

    #[test]
    fn test_serialize_omits_missing_timestamp() {
        let snapshot = CountsSnapshot::new(vec![CounterSnapshot::new("a", 1)]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"counters":[{"name":"a","value":1}]}"#);
    }

    #[test]
    fn test_serialize_with_timestamp() {
        let snapshot =
            CountsSnapshot::new(vec![CounterSnapshot::new("a", 1)]).with_timestamp(1234567890);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""timestamp_ms":1234567890"#));
    }

    #[test]
    fn test_deserialize_roundtrip() {
        let json = r#"{"timestamp_ms":99,"counters":[{"name":"a","value":-5}]}"#;
        let snapshot: CountsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ms, Some(99));
        assert_eq!(snapshot.counters, vec![CounterSnapshot::new("a", -5)]);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_observer_compact_and_pretty() {
        let snapshot = CountsSnapshot::new(vec![CounterSnapshot::new("a", 1)]);
        let compact = JsonObserver::new().render(&snapshot).unwrap();
        assert_eq!(compact, r#"{"counters":[{"name":"a","value":1}]}"#);

        let pretty = JsonObserver::new().pretty(true).render(&snapshot).unwrap();
        assert!(pretty.contains('\n'));
    }
}

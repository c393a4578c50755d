//! Engine configuration.

use std::time::Duration;

/// Tunables for a [`CounterEngine`](crate::engine::CounterEngine).
///
/// All knobs have production-ready defaults; override them with the
/// builder-style `with_*` methods:
///
/// ```rust
/// use contabile::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_update_interval(Duration::from_secs(30))
///     .with_flush_retries(5);
///
/// assert_eq!(config.update_interval, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Minimum time between durable flushes of a counter.
    ///
    /// Larger intervals coalesce more increments per durable write but
    /// widen the window of buffered (evictable) value. `Duration::ZERO`
    /// turns every increment into a synchronous durable write.
    pub update_interval: Duration,

    /// How many times a flush redoes its read-modify-write cycle after a
    /// commit conflict before abandoning the drained delta.
    pub flush_retries: u32,

    /// TTL applied to the flush-stamp cache entry.
    ///
    /// Losing the stamp only costs an extra flush being scheduled, so
    /// this can be generous without correctness impact.
    pub stamp_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(10),
            flush_retries: 3,
            stamp_ttl: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Sets the default flush throttle interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Sets the commit-conflict retry budget for flushes.
    pub fn with_flush_retries(mut self, retries: u32) -> Self {
        self.flush_retries = retries;
        self
    }

    /// Sets the TTL of the flush-stamp cache entry.
    pub fn with_stamp_ttl(mut self, ttl: Duration) -> Self {
        self.stamp_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.update_interval, Duration::from_secs(10));
        assert_eq!(config.flush_retries, 3);
        assert_eq!(config.stamp_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_update_interval(Duration::ZERO)
            .with_flush_retries(0)
            .with_stamp_ttl(Duration::from_secs(60));
        assert_eq!(config.update_interval, Duration::ZERO);
        assert_eq!(config.flush_retries, 0);
        assert_eq!(config.stamp_ttl, Duration::from_secs(60));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let config = EngineConfig::default().with_flush_retries(7);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_partial_uses_defaults() {
        let back: EngineConfig = serde_json::from_str(r#"{"flush_retries":1}"#).unwrap();
        assert_eq!(back.flush_retries, 1);
        assert_eq!(back.update_interval, Duration::from_secs(10));
    }
}

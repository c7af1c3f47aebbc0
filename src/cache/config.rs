//! Cache engine configuration.
//!
//! Controls entry retention and poll pacing. The settings loader builds
//! this from the `[cache]` section of `ricordo.toml`.

use std::time::Duration;

// Default values for engine configuration
const DEFAULT_UNUSED_ENTRY_GRACE_MS: u64 = 10_000;
const DEFAULT_MIN_POLL_INTERVAL_MS: u64 = 50;

/// Retention and pacing knobs for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grace period (ms) before an entry with zero subscribers is removed.
    ///
    /// Zero means unused entries are dropped as soon as the last subscriber
    /// leaves.
    pub unused_entry_grace_ms: u64,
    /// Floor (ms) for per-subscriber poll intervals.
    pub min_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unused_entry_grace_ms: DEFAULT_UNUSED_ENTRY_GRACE_MS,
            min_poll_interval_ms: DEFAULT_MIN_POLL_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for EngineConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            unused_entry_grace_ms: settings.unused_entry_grace_period.as_millis() as u64,
            min_poll_interval_ms: settings.min_poll_interval.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    /// Convenience constructor for demos and tests.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            unused_entry_grace_ms: grace.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Returns the unused-entry grace period as a `Duration`.
    pub fn unused_entry_grace(&self) -> Duration {
        Duration::from_millis(self.unused_entry_grace_ms)
    }

    /// Returns `requested` floored to the configured minimum poll interval,
    /// itself never below 1ms.
    pub fn clamp_poll_interval(&self, requested: Duration) -> Duration {
        let floor = Duration::from_millis(self.min_poll_interval_ms.max(1));
        requested.max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.unused_entry_grace_ms, 10_000);
        assert_eq!(config.min_poll_interval_ms, 50);
        assert_eq!(config.unused_entry_grace(), Duration::from_secs(10));
    }

    #[test]
    fn poll_interval_clamps_to_floor() {
        let config = EngineConfig::default();
        assert_eq!(
            config.clamp_poll_interval(Duration::from_millis(5)),
            Duration::from_millis(50)
        );
        assert_eq!(
            config.clamp_poll_interval(Duration::from_millis(400)),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn zero_grace_means_immediate_removal() {
        let config = EngineConfig::with_grace(Duration::ZERO);
        assert_eq!(config.unused_entry_grace(), Duration::ZERO);
        assert_eq!(config.min_poll_interval_ms, 50);
    }
}

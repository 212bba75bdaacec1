//! Deduplication configuration.
//!
//! Sizing for the membership filter and the history window it is built from.

use serde::{Deserialize, Serialize};

/// Default filter capacity.
pub const DEFAULT_FILTER_CAPACITY: usize = 1000;
/// Default false-positive target.
pub const DEFAULT_FILTER_ERROR_RATE: f64 = 0.01;
/// Default build window: four weeks.
pub const DEFAULT_FILTER_WINDOW_DAYS: u32 = 28;

/// Configuration for the deduplication engine.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `WECHAT_DEDUP_FILTER_CAPACITY` | usize | `1000` | Expected fingerprints in the filter |
/// | `WECHAT_DEDUP_FILTER_ERROR_RATE` | f64 | `0.01` | Target false-positive rate |
/// | `WECHAT_DEDUP_FILTER_WINDOW_DAYS` | u32 | `28` | History loaded at startup |
///
/// # Example
///
/// ```rust
/// use wechat_dedup::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default().with_filter_capacity(5000);
/// assert_eq!(config.filter_capacity, 5000);
/// assert_eq!(config.filter_window_days, 28);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    /// Expected number of fingerprints; the filter is sized for at least this.
    pub filter_capacity: usize,

    /// Target false-positive rate, in `(0, 1)`.
    pub filter_error_rate: f64,

    /// Days of history loaded into the filter at startup.
    pub filter_window_days: u32,
}

impl DeduplicationConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults for unset or unparsable variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    #[must_use]
    pub fn with_env_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("WECHAT_DEDUP_FILTER_CAPACITY").and_then(|v| v.parse().ok()) {
            self.filter_capacity = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_FILTER_ERROR_RATE").and_then(|v| v.parse().ok()) {
            self.filter_error_rate = v;
        }
        if let Some(v) = lookup("WECHAT_DEDUP_FILTER_WINDOW_DAYS").and_then(|v| v.parse().ok()) {
            self.filter_window_days = v;
        }
        self
    }

    /// History window as a duration.
    #[must_use]
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.filter_window_days))
    }

    /// Builder method to set the filter capacity.
    #[must_use]
    pub const fn with_filter_capacity(mut self, capacity: usize) -> Self {
        self.filter_capacity = capacity;
        self
    }

    /// Builder method to set the false-positive target.
    #[must_use]
    pub const fn with_filter_error_rate(mut self, rate: f64) -> Self {
        self.filter_error_rate = rate;
        self
    }

    /// Builder method to set the history window.
    #[must_use]
    pub const fn with_filter_window_days(mut self, days: u32) -> Self {
        self.filter_window_days = days;
        self
    }
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            filter_capacity: DEFAULT_FILTER_CAPACITY,
            filter_error_rate: DEFAULT_FILTER_ERROR_RATE,
            filter_window_days: DEFAULT_FILTER_WINDOW_DAYS,
        }
    }
}

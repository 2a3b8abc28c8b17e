use crate::config::RetryConfig;
use std::time::Duration;

/// Retry budget for one logical fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,

    /// Delay after the first failure
    pub backoff_base: Duration,

    /// Upper bound on any single delay
    pub backoff_max: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetrySettings {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_secs_f64(config.backoff_base_s),
            backoff_max: Duration::from_secs_f64(config.backoff_max_s),
        }
    }

    /// Delay after the failure of attempt `attempt_index` (0-based)
    ///
    /// `min(backoff_max, backoff_base * 2^attempt_index)`
    ///
    /// # Examples
    ///
    /// ```
    /// use network_shield::RetrySettings;
    /// use std::time::Duration;
    ///
    /// let settings = RetrySettings {
    ///     max_attempts: 5,
    ///     backoff_base: Duration::from_secs(1),
    ///     backoff_max: Duration::from_secs(5),
    /// };
    /// assert_eq!(settings.backoff_delay(0), Duration::from_secs(1));
    /// assert_eq!(settings.backoff_delay(2), Duration::from_secs(4));
    /// assert_eq!(settings.backoff_delay(3), Duration::from_secs(5));
    /// ```
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

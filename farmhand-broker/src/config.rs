//! Broker configuration
//!
//! Retry policy, farm call limits and polling cadence. Every value has a
//! default and can be overridden through the environment.

use std::time::Duration;

use anyhow::Context;

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Retries after the first attempt; a submission makes at most
    /// `max_retries + 1` farm calls
    pub max_retries: u32,

    /// Delay before the first retry, doubled after each further attempt
    pub initial_backoff: Duration,

    /// Upper bound on the retry delay
    pub max_backoff: Duration,

    /// Time allowed for a single farm call
    pub attempt_timeout: Duration,

    /// Farm calls allowed in flight at once across all jobs
    pub max_concurrent_farm_calls: usize,

    /// How often submitted jobs are polled for status
    pub poll_interval: Duration,
}

impl BrokerConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(30),
            max_concurrent_farm_calls: 4,
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// All variables are optional:
    /// - FARMHAND_MAX_RETRIES (default: 3)
    /// - FARMHAND_INITIAL_BACKOFF_MS (default: 500)
    /// - FARMHAND_MAX_BACKOFF_MS (default: 30000)
    /// - FARMHAND_ATTEMPT_TIMEOUT (seconds, default: 30)
    /// - FARMHAND_MAX_FARM_CALLS (default: 4)
    /// - FARMHAND_POLL_INTERVAL (seconds, default: 5)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, validating the result
    ///
    /// A variable that is set but does not parse is an error rather than a
    /// silent fallback to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::new();

        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, raw))
                })
                .transpose()
        };

        let max_retries = match number("FARMHAND_MAX_RETRIES")? {
            Some(value) => u32::try_from(value).context("FARMHAND_MAX_RETRIES is too large")?,
            None => defaults.max_retries,
        };

        let initial_backoff = number("FARMHAND_INITIAL_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        let max_backoff = number("FARMHAND_MAX_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);

        let attempt_timeout = number("FARMHAND_ATTEMPT_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.attempt_timeout);

        let max_concurrent_farm_calls = match number("FARMHAND_MAX_FARM_CALLS")? {
            Some(value) => usize::try_from(value).context("FARMHAND_MAX_FARM_CALLS is too large")?,
            None => defaults.max_concurrent_farm_calls,
        };

        let poll_interval = number("FARMHAND_POLL_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let config = Self {
            max_retries,
            initial_backoff,
            max_backoff,
            attempt_timeout,
            max_concurrent_farm_calls,
            poll_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_backoff.is_zero() {
            anyhow::bail!("initial_backoff must be greater than 0");
        }

        if self.max_backoff < self.initial_backoff {
            anyhow::bail!("max_backoff must not be shorter than initial_backoff");
        }

        if self.attempt_timeout.is_zero() {
            anyhow::bail!("attempt_timeout must be greater than 0");
        }

        if self.max_concurrent_farm_calls == 0 {
            anyhow::bail!("max_concurrent_farm_calls must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }

    /// Delay before the retry that follows attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_farm_calls, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BrokerConfig::default();
        assert!(config.validate().is_ok());

        config.max_concurrent_farm_calls = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_farm_calls = 1;

        config.max_backoff = Duration::from_millis(100);
        assert!(config.validate().is_err());
        config.max_backoff = Duration::from_secs(1);

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("FARMHAND_MAX_RETRIES", "0"),
            ("FARMHAND_INITIAL_BACKOFF_MS", "10"),
            ("FARMHAND_MAX_BACKOFF_MS", "40"),
            ("FARMHAND_POLL_INTERVAL", "1"),
        ]))
        .unwrap();

        assert_eq!(config.max_retries, 0);
        assert_eq!(config.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.max_backoff, Duration::from_millis(40));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = BrokerConfig::from_lookup(lookup(&[("FARMHAND_MAX_RETRIES", "lots")])).unwrap_err();
        assert!(err.to_string().contains("FARMHAND_MAX_RETRIES"));

        assert!(BrokerConfig::from_lookup(lookup(&[("FARMHAND_MAX_FARM_CALLS", "0")])).is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = BrokerConfig {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3000),
            ..BrokerConfig::default()
        };

        assert_eq!(config.backoff_for(1), Duration::from_millis(500));
        assert_eq!(config.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(config.backoff_for(4), Duration::from_millis(3000));
        assert_eq!(config.backoff_for(64), Duration::from_millis(3000));
    }
}

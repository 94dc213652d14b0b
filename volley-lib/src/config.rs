use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lower bound for adaptive timeouts
const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Default upper bound for adaptive timeouts
const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of latency samples the timeout statistics are computed from
const DEFAULT_SAMPLE_SIZE: usize = 200;

/// Configuration of the adaptive timeout statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Adaptive timeouts never go below this value
    #[serde(default = "default_min_timeout", with = "humantime_serde")]
    pub min_timeout: Duration,

    /// Adaptive timeouts never go above this value.
    /// Attempts past the retry budget always get this timeout.
    #[serde(default = "default_max_timeout", with = "humantime_serde")]
    pub max_timeout: Duration,

    /// Number of most recent samples the statistics are computed from
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            min_timeout: default_min_timeout(),
            max_timeout: default_max_timeout(),
            sample_size: default_sample_size(),
        }
    }
}

/// Default lower bound for adaptive timeouts
const fn default_min_timeout() -> Duration {
    DEFAULT_MIN_TIMEOUT
}

/// Default upper bound for adaptive timeouts
const fn default_max_timeout() -> Duration {
    DEFAULT_MAX_TIMEOUT
}

/// Default number of latency samples
const fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

impl TimeoutConfig {
    /// Create a `TimeoutConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(
        min_timeout: Option<Duration>,
        max_timeout: Option<Duration>,
        sample_size: Option<usize>,
    ) -> Self {
        Self {
            min_timeout: min_timeout.unwrap_or(DEFAULT_MIN_TIMEOUT),
            max_timeout: max_timeout.unwrap_or(DEFAULT_MAX_TIMEOUT),
            sample_size: sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE),
        }
    }

    /// Return a copy where `min_timeout <= max_timeout` and `sample_size >= 1`
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            min_timeout: self.min_timeout.min(self.max_timeout),
            max_timeout: self.max_timeout,
            sample_size: self.sample_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_config() {
        let config = TimeoutConfig::default();
        assert_eq!(config.min_timeout, Duration::from_millis(200));
        assert_eq!(config.max_timeout, Duration::from_secs(5));
        assert_eq!(config.sample_size, 200);
    }

    #[test]
    fn test_from_options() {
        let config = TimeoutConfig::from_options(None, Some(Duration::from_secs(10)), Some(20));
        assert_eq!(config.min_timeout, Duration::from_millis(200));
        assert_eq!(config.max_timeout, Duration::from_secs(10));
        assert_eq!(config.sample_size, 20);
    }

    #[test]
    fn test_normalized() {
        let config = TimeoutConfig {
            min_timeout: Duration::from_secs(3),
            max_timeout: Duration::from_secs(1),
            sample_size: 0,
        }
        .normalized();
        assert_eq!(config.min_timeout, Duration::from_secs(1));
        assert_eq!(config.sample_size, 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = TimeoutConfig {
            min_timeout: Duration::from_millis(50),
            max_timeout: Duration::from_secs(2),
            sample_size: 10,
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: TimeoutConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config() {
        let config: TimeoutConfig = toml::from_str(r#"max_timeout = "750ms""#).unwrap();
        assert_eq!(config.max_timeout, Duration::from_millis(750));
        assert_eq!(config.min_timeout, Duration::from_millis(200));
        assert_eq!(config.sample_size, 200);
    }
}

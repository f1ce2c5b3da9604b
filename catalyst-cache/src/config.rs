use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Retention settings for a cache. The retention time has no default so
/// every cache states it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachePolicy {
    /// How long an unused entry is kept, in milliseconds. Zero still defers
    /// disposal to the scheduler.
    pub retention_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl CachePolicy {
    pub fn new(retention: Duration) -> Self {
        CachePolicy {
            retention_ms: u64::try_from(retention.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml() {
        let policy = CachePolicy::from_toml_str("retention_ms = 250").unwrap();
        assert_eq!(policy.retention(), Duration::from_millis(250));
    }

    #[test]
    fn retention_is_required() {
        let err = CachePolicy::from_toml_str("").unwrap_err();
        assert!(err.to_string().contains("retention_ms"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(CachePolicy::from_toml_str("retention_ms = 1\nretention = 2").is_err());
    }

    #[test]
    fn nested_in_a_larger_config() {
        #[derive(Deserialize)]
        struct AppConfig {
            sessions: CachePolicy,
            feeds: CachePolicy,
        }

        let config: AppConfig = toml::from_str(
            "[sessions]\nretention_ms = 0\n\n[feeds]\nretention_ms = 30000\n",
        )
        .unwrap();

        assert_eq!(config.sessions.retention(), Duration::ZERO);
        assert_eq!(config.feeds, CachePolicy::new(Duration::from_secs(30)));
    }
}

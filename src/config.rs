//! Service configuration.

use crate::error::{Result, ShowtimeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Showtime service configuration.
///
/// Every field is optional when loaded from JSON; missing fields take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Max buffered announcements per subscriber before new ones are dropped.
    /// Default: 5
    pub inbox_capacity: usize,

    /// Interval between periodic announcements, in milliseconds.
    /// Default: 2000
    pub tick_interval_ms: u64,

    /// Largest accepted cue datagram, in bytes. Longer payloads are truncated.
    /// Default: 512
    pub max_datagram_size: usize,

    /// Max cue records retained (None = unbounded for the life of the process).
    pub history_limit: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 5,
            tick_interval_ms: 2000,
            max_datagram_size: 512,
            history_limit: None,
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inbox_capacity == 0 {
            return Err(ShowtimeError::InvalidConfig(
                "inbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ShowtimeError::InvalidConfig(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_datagram_size == 0 {
            return Err(ShowtimeError::InvalidConfig(
                "max_datagram_size must be greater than zero".to_string(),
            ));
        }
        if self.history_limit == Some(0) {
            return Err(ShowtimeError::InvalidConfig(
                "history_limit must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.inbox_capacity, 5);
        assert_eq!(config.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.max_datagram_size, 512);
        assert!(config.history_limit.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = ServiceConfig::from_json_str(r#"{"inbox_capacity": 16}"#).unwrap();
        assert_eq!(config.inbox_capacity, 16);
        assert_eq!(config.tick_interval_ms, 2000);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = ServiceConfig::from_json_str(r#"{"inbox_capacity": 0}"#);
        assert!(matches!(result, Err(ShowtimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = ServiceConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ShowtimeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_history_limit() {
        let result = ServiceConfig::from_json_str(r#"{"history_limit": 0}"#);
        assert!(matches!(result, Err(ShowtimeError::InvalidConfig(_))));

        let bounded = ServiceConfig {
            history_limit: Some(1),
            ..Default::default()
        };
        bounded.validate().unwrap();
    }

    #[test]
    fn test_malformed_json() {
        let result = ServiceConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ShowtimeError::Deserialization(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tick_interval_ms": 250, "history_limit": 100}}"#).unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.history_limit, Some(100));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ServiceConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ShowtimeError::Io(_))));
    }
}

//! Polling configuration loaded from YAML or JSON.
//!
//! Durations are written in humantime notation:
//!
//! ```yaml
//! interval: 10s
//! timeout: 5m        # null for no deadline
//! read_retry:
//!   max_attempts: 3
//!   min_delay: 500ms
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use standby_core::{PolicyError, PollPolicy, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid polling policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Retry settings for individual state reads.
///
/// The poller never retries a failed query; this wraps the query so that
/// transient read errors are retried before the poller sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadRetry {
    /// Total attempts per read, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    #[serde(default = "default_min_delay", with = "duration_human")]
    pub min_delay: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay: default_min_delay(),
        }
    }
}

/// Configuration for waiting on a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Sleep between state queries
    #[serde(with = "duration_human")]
    pub interval: Duration,

    /// Deadline from the first query; `None` waits indefinitely
    #[serde(with = "option_duration_human")]
    pub timeout: Option<Duration>,

    /// Retry transient read errors before they reach the poller
    pub read_retry: Option<ReadRetry>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: Some(DEFAULT_TIMEOUT),
            read_retry: None,
        }
    }
}

impl PollConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PollConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PollConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Build the polling policy described by this config.
    pub fn policy(&self) -> Result<PollPolicy, ConfigError> {
        Ok(PollPolicy::new(self.interval)?.with_timeout(self.timeout))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.policy()?;

        if let Some(retry) = &self.read_retry {
            if retry.max_attempts == 0 {
                return Err(ConfigError::ValidationError(
                    "read_retry.max_attempts must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

mod duration_human {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

mod option_duration_human {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => {
                serializer.serialize_some(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|raw| humantime::parse_duration(&raw).map_err(D::Error::custom))
            .transpose()
    }
}

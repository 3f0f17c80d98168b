//! Engine configuration, read from `GOODSTOCK_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::jobs::RetryPolicy;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when stockit sync is enabled")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub stockit_enabled: bool,
    pub stockit_url: Option<String>,
    pub stockit_api_key: Option<String>,
    pub stockit_timeout_ms: u64,
    /// Attempts per deferred sync job before it is dead-lettered.
    pub sync_max_attempts: u32,
    /// Reloads after an optimistic-concurrency conflict before giving up.
    pub commit_retries: u32,
    pub sync_poll_ms: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            stockit_enabled: false,
            stockit_url: None,
            stockit_api_key: None,
            stockit_timeout_ms: 5000,
            sync_max_attempts: 5,
            commit_retries: 3,
            sync_poll_ms: 100,
        }
    }
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            stockit_enabled: parse(&get, "GOODSTOCK_STOCKIT_ENABLED")?.unwrap_or(defaults.stockit_enabled),
            stockit_url: get("GOODSTOCK_STOCKIT_URL"),
            stockit_api_key: get("GOODSTOCK_STOCKIT_API_KEY"),
            stockit_timeout_ms: parse(&get, "GOODSTOCK_STOCKIT_TIMEOUT_MS")?.unwrap_or(defaults.stockit_timeout_ms),
            sync_max_attempts: parse(&get, "GOODSTOCK_SYNC_MAX_ATTEMPTS")?.unwrap_or(defaults.sync_max_attempts),
            commit_retries: parse(&get, "GOODSTOCK_COMMIT_RETRIES")?.unwrap_or(defaults.commit_retries),
            sync_poll_ms: parse(&get, "GOODSTOCK_SYNC_POLL_MS")?.unwrap_or(defaults.sync_poll_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stockit_enabled && self.stockit_url.is_none() {
            return Err(ConfigError::Missing("GOODSTOCK_STOCKIT_URL"));
        }
        if self.sync_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "GOODSTOCK_SYNC_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn stockit_timeout(&self) -> Duration {
        Duration::from_millis(self.stockit_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_ms)
    }

    /// Retry policy for deferred sync jobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_max_attempts,
            ..RetryPolicy::default()
        }
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

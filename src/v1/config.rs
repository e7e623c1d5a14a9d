use std::{env, time::Duration};

use thiserror::Error;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub region: String,
    pub poll_interval: Duration,
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            poll_interval: Duration::from_secs(10),
            create_timeout: Duration::from_secs(60 * 60),
            delete_timeout: Duration::from_secs(60 * 60),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: raw,
                    }),
                    Ok(value) => Ok(Duration::from_secs(value)),
                },
            }
        };
        Ok(Self {
            region: lookup("AWS_REGION")
                .filter(|region| !region.is_empty())
                .unwrap_or(defaults.region),
            poll_interval: secs("RSVEND_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            create_timeout: secs("RSVEND_CREATE_TIMEOUT_SECS", defaults.create_timeout)?,
            delete_timeout: secs("RSVEND_DELETE_TIMEOUT_SECS", defaults.delete_timeout)?,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}, expected a positive number of seconds")]
    InvalidValue { key: String, value: String },
}

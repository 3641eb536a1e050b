use std::{str::FromStr, time::Duration};

use crate::ConfigError;

/// Default number of concurrent jobs per worker pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Configures per-attempt timeout and backoff behavior of outbound calls.
///
/// The retry budget itself lives on each [`CallRequest`](crate::CallRequest).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallOptions {
    /// Per-attempt connect + response timeout in milliseconds.
    pub timeout_ms: u64,
    /// First backoff wait in milliseconds; doubles after every retried attempt.
    pub initial_backoff_ms: u64,
    /// Ceiling for any single wait, including `Retry-After` driven ones.
    pub max_backoff_ms: u64,
    /// Optional bound on the whole retry sequence.
    pub deadline_ms: Option<u64>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            deadline_ms: None,
        }
    }
}

impl CallOptions {
    /// Reads overrides from the environment, falling back to defaults.
    ///
    /// Reads:
    /// - `CALLGUARD_TIMEOUT_MS`
    /// - `CALLGUARD_INITIAL_BACKOFF_MS`
    /// - `CALLGUARD_MAX_BACKOFF_MS`
    /// - `CALLGUARD_DEADLINE_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            timeout_ms: env_or("CALLGUARD_TIMEOUT_MS", defaults.timeout_ms)?,
            initial_backoff_ms: env_or(
                "CALLGUARD_INITIAL_BACKOFF_MS",
                defaults.initial_backoff_ms,
            )?,
            max_backoff_ms: env_or("CALLGUARD_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
            deadline_ms: env_var("CALLGUARD_DEADLINE_MS")?,
        })
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sizing for the pools owned by [`Services`](crate::Services).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServicesConfig {
    pub call: CallOptions,
    /// Concurrent calls dispatched by `execute_async`.
    pub call_pool_size: usize,
    /// Concurrent jobs dispatched by `run_async`.
    pub task_pool_size: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            call: CallOptions::default(),
            call_pool_size: DEFAULT_POOL_SIZE,
            task_pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl ServicesConfig {
    /// Reads [`CallOptions::from_env`] plus `CALLGUARD_POOL_SIZE`, which sizes
    /// both pools.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pool_size = env_or("CALLGUARD_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CALLGUARD_POOL_SIZE",
                expected: "a positive integer",
                value: "0".to_owned(),
            });
        }
        Ok(Self {
            call: CallOptions::from_env()?,
            call_pool_size: pool_size,
            task_pool_size: pool_size,
        })
    }
}

fn env_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_setting(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(env_var(name)?.unwrap_or(default))
}

fn parse_setting<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { name });
    }
    trimmed.parse().map_err(|_| ConfigError::Invalid {
        name,
        expected: "an unsigned integer",
        value: trimmed.to_owned(),
    })
}

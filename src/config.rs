//! Process configuration, read from `DOCKER_GRAPH_*` environment variables.
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub const BIND: &str = "DOCKER_GRAPH_BIND";
pub const DEBOUNCE_MS: &str = "DOCKER_GRAPH_DEBOUNCE_MS";
pub const INSPECT_TIMEOUT_MS: &str = "DOCKER_GRAPH_INSPECT_TIMEOUT_MS";
pub const QUEUE_CAPACITY: &str = "DOCKER_GRAPH_QUEUE_CAPACITY";
pub const SUBSCRIBER_BUFFER: &str = "DOCKER_GRAPH_SUBSCRIBER_BUFFER";
pub const POOL_MAX_IDLE: &str = "DOCKER_GRAPH_POOL_MAX_IDLE";
pub const POOL_IDLE_TIMEOUT_SECS: &str = "DOCKER_GRAPH_POOL_IDLE_TIMEOUT_SECS";
pub const RESTART_DELAY_MS: &str = "DOCKER_GRAPH_RESTART_DELAY_MS";

/// Settings of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept around.
    pub max_idle: usize,
    /// Idle connections are closed after this long without a checkout.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 4,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Settings of the container repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub debounce_delay: Duration,
    pub inspect_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(200),
            inspect_timeout: Duration::from_secs(5),
            queue_capacity: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub subscriber_buffer: usize,
    pub restart_delay: Duration,
    pub pool: PoolConfig,
    pub repository: RepositoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            subscriber_buffer: 5,
            restart_delay: Duration::from_secs(1),
            pool: PoolConfig::default(),
            repository: RepositoryConfig::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, falling back to the
    /// defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let millis = |key, default: Duration| {
            parse::<u64>(&lookup, key)
                .map(|value| value.map(Duration::from_millis).unwrap_or(default))
        };

        let repository = RepositoryConfig {
            debounce_delay: millis(DEBOUNCE_MS, defaults.repository.debounce_delay)?,
            inspect_timeout: millis(INSPECT_TIMEOUT_MS, defaults.repository.inspect_timeout)?,
            queue_capacity: positive(&lookup, QUEUE_CAPACITY)?
                .unwrap_or(defaults.repository.queue_capacity),
        };
        let pool = PoolConfig {
            max_idle: parse(&lookup, POOL_MAX_IDLE)?.unwrap_or(defaults.pool.max_idle),
            idle_timeout: parse::<u64>(&lookup, POOL_IDLE_TIMEOUT_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.idle_timeout),
        };

        Ok(Self {
            bind: parse(&lookup, BIND)?.unwrap_or(defaults.bind),
            subscriber_buffer: positive(&lookup, SUBSCRIBER_BUFFER)?
                .unwrap_or(defaults.subscriber_buffer),
            restart_delay: millis(RESTART_DELAY_MS, defaults.restart_delay)?,
            pool,
            repository,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|err| Error::InvalidValue {
            key,
            reason: err.to_string(),
            value,
        })
}

// Channel capacities must be non-zero or tokio panics.
fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<usize>> {
    match parse::<usize>(lookup, key)? {
        Some(0) => Err(Error::InvalidValue {
            key,
            value: "0".to_owned(),
            reason: "must be greater than zero".to_owned(),
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.repository.debounce_delay, Duration::from_millis(200));
        assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (BIND, "0.0.0.0:9000"),
            (DEBOUNCE_MS, "50"),
            (POOL_IDLE_TIMEOUT_SECS, "72000"),
            (POOL_MAX_IDLE, "0"),
            (QUEUE_CAPACITY, " 8 "),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.repository.debounce_delay, Duration::from_millis(50));
        assert_eq!(config.pool.idle_timeout, Duration::from_secs(72000));
        assert_eq!(config.pool.max_idle, 0);
        assert_eq!(config.repository.queue_capacity, 8);
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_lookup(lookup(&[(DEBOUNCE_MS, "soon")])).unwrap_err();
        match err {
            Error::InvalidValue { key, value, .. } => {
                assert_eq!(key, DEBOUNCE_MS);
                assert_eq!(value, "soon");
            }
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(Config::from_lookup(lookup(&[(SUBSCRIBER_BUFFER, "0")])).is_err());
    }
}

//! Configuration loaded from environment variables with defaults.
//!
//! `main` loads a `.env` file (if present) through [`load_dotenv`] before
//! reading these.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::RetryConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://storefront.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before SQLITE_BUSY
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|value| parse::<u64>(&value));
        let defaults = RetryConfig::default();

        Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://storefront.db".to_string()),
                max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| parse(&s))
                    .unwrap_or(5),
                busy_timeout: Duration::from_millis(parsed("DATABASE_BUSY_TIMEOUT_MS").unwrap_or(5000)),
            },
            metrics: MetricsConfig {
                host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: lookup("METRICS_PORT").and_then(|s| parse(&s)).unwrap_or(9090),
            },
            retry: RetryConfig {
                max_attempts: lookup("RETRY_MAX_ATTEMPTS")
                    .and_then(|s| parse(&s))
                    .unwrap_or(defaults.max_attempts)
                    .max(1),
                initial_delay: parsed("RETRY_INITIAL_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.initial_delay),
                max_delay: parsed("RETRY_MAX_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.max_delay),
                multiplier: defaults.multiplier,
            },
        }
    }
}

/// Load `.env` into the process environment. A missing file is normal;
/// any other failure is handed back for the caller to report once logging
/// is up.
pub fn load_dotenv() -> Option<dotenvy::Error> {
    dotenv_failure(dotenvy::dotenv())
}

fn dotenv_failure<T>(result: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    match result {
        Ok(_) => None,
        Err(e) if e.not_found() => None,
        Err(e) => Some(e),
    }
}

fn parse<T: FromStr>(raw: &str) -> Option<T> {
    let value = raw.trim().parse().ok();
    if value.is_none() {
        tracing::warn!(value = raw, "Ignoring unparseable configuration value");
    }
    value
}

//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::RetryPolicy;
use thiserror::Error;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,

    /// One JSON object per line.
    Json,
}

#[derive(Debug, Error)]
#[error("Unknown log format '{0}', expected 'pretty' or 'json'")]
pub struct ParseLogFormatError(String);

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "plain" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ParseLogFormatError(s.to_string())),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset selects the in-memory stores
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `COMMAND_MAX_ATTEMPTS`: attempts per command on conflicts (default: `3`)
/// - `COMMAND_RETRY_BACKOFF_MS`: base retry delay (default: `10`)
/// - `DEFAULT_SLOT_MINUTES`: slot length when a request omits it (default: `60`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub command_max_attempts: u32,
    pub command_retry_backoff_ms: u64,
    pub default_slot_minutes: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed_var("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed_var("LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed_var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            command_max_attempts: parsed_var("COMMAND_MAX_ATTEMPTS")
                .unwrap_or(defaults.command_max_attempts),
            command_retry_backoff_ms: parsed_var("COMMAND_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.command_retry_backoff_ms),
            default_slot_minutes: parsed_var("DEFAULT_SLOT_MINUTES")
                .filter(|minutes: &i64| valid_slot_minutes(*minutes).is_some())
                .unwrap_or(defaults.default_slot_minutes),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.command_max_attempts,
            Duration::from_millis(self.command_retry_backoff_ms),
        )
    }

    /// Default slot length; out-of-range values fall back to 60 minutes.
    pub fn default_slot(&self) -> chrono::Duration {
        valid_slot_minutes(self.default_slot_minutes)
            .unwrap_or_else(|| chrono::Duration::hours(1))
    }
}

fn valid_slot_minutes(minutes: i64) -> Option<chrono::Duration> {
    chrono::Duration::try_minutes(minutes).filter(|d| *d > chrono::Duration::zero())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            command_max_attempts: 3,
            command_retry_backoff_ms: 10,
            default_slot_minutes: 60,
        }
    }
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.default_slot_minutes, 60);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config {
            command_max_attempts: 5,
            command_retry_backoff_ms: 25,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(25));
    }

    #[test]
    fn test_default_slot_rejects_out_of_range_minutes() {
        for minutes in [0, -5, i64::MAX] {
            let config = Config {
                default_slot_minutes: minutes,
                ..Config::default()
            };
            assert_eq!(config.default_slot(), chrono::Duration::minutes(60));
        }

        let config = Config {
            default_slot_minutes: 30,
            ..Config::default()
        };
        assert_eq!(config.default_slot(), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

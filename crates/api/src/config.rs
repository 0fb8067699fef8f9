//! Process configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `BIND_ADDR` | `0.0.0.0:8080` | listen address |
//! | `JWT_SECRET` | `dev-secret` (with a warning) | HS256 key for bearer tokens |
//! | `DATABASE_URL` | unset | Postgres URL; unset means the in-memory store |
//! | `DATABASE_MAX_CONNECTIONS` | `10` | pool size |
//! | `STOCK_OP_TIMEOUT_MS` | `5000` | upper bound for one stock operation |
//! | `STOCK_CONFLICT_RETRIES` | `3` | re-runs after a stale version |
//! | `LOG_FORMAT` | `json` | `json` or `pretty` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use invista_infra::ServiceConfig;
use invista_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub stock: ServiceConfig,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only the log format, so tracing can be installed before the rest of
    /// the configuration (and its warnings) is read.
    pub fn log_format_from_env() -> Result<LogFormat, ConfigError> {
        Self::log_format_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn log_format_from_lookup<F>(lookup: F) -> Result<LogFormat, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        parse_or(&lookup, "LOG_FORMAT", LogFormat::Json)
    }

    /// Read the configuration through `lookup` (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let defaults = ServiceConfig::default();
        let op_timeout_ms: u64 = parse_or(
            &lookup,
            "STOCK_OP_TIMEOUT_MS",
            defaults.op_timeout.as_millis() as u64,
        )?;
        if op_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "STOCK_OP_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            bind_addr: parse_or(
                &lookup,
                "BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
            jwt_secret,
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            stock: ServiceConfig {
                op_timeout: Duration::from_millis(op_timeout_ms),
                conflict_retries: parse_or(
                    &lookup,
                    "STOCK_CONFLICT_RETRIES",
                    defaults.conflict_retries,
                )?,
                retry_backoff: defaults.retry_backoff,
            },
            log_format: Self::log_format_from_lookup(&lookup)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.stock.op_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.stock.conflict_retries, 3);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/invista"),
            ("STOCK_OP_TIMEOUT_MS", "250"),
            ("STOCK_CONFLICT_RETRIES", "0"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/invista"));
        assert_eq!(cfg.stock.op_timeout, Duration::from_millis(250));
        assert_eq!(cfg.stock.conflict_retries, 0);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = config(&[("STOCK_OP_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STOCK_OP_TIMEOUT_MS", .. }));

        assert!(config(&[("STOCK_OP_TIMEOUT_MS", "0")]).is_err());
        assert!(config(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn log_format_is_readable_on_its_own() {
        let lookup = |key: &str| (key == "LOG_FORMAT").then(|| "pretty".to_string());
        assert_eq!(AppConfig::log_format_from_lookup(lookup).unwrap(), LogFormat::Pretty);
        assert_eq!(AppConfig::log_format_from_lookup(|_| None).unwrap(), LogFormat::Json);

        let err = AppConfig::log_format_from_lookup(|_| Some("xml".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LOG_FORMAT", .. }));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert!(config(&[("DATABASE_URL", "  ")]).unwrap().database_url.is_none());
    }
}

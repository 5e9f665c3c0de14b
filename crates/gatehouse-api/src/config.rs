//! # Runtime Configuration
//!
//! [`AppConfig`] is read once at startup from environment variables. The
//! lookup is injectable so tests can exercise parsing without touching the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use gatehouse_engine::{EngineConfig, MAX_VALIDITY_HOURS, MIN_VALIDITY_HOURS};

use crate::middleware::rate_limit::RateLimitConfig;

/// Log output format for the API binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A configuration variable held an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("{var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Application configuration.
///
/// Custom `Debug` redacts the bearer token and the credential secret.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Hex-encoded HMAC secret. If `None`, an ephemeral key is generated.
    pub credential_secret_hex: Option<Zeroizing<String>>,
    /// JSON file of visitors and units loaded into the directory.
    pub directory_seed: Option<PathBuf>,
    /// Per-record lock wait before a request is answered with 503.
    pub lock_timeout: Duration,
    /// Interval of the expiry sweep and ledger reconcile.
    pub presence_refresh: Duration,
    /// Validity used when a create request omits it.
    pub default_validity_hours: u32,
    pub log_format: LogFormat,
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "credential_secret_hex",
                &self.credential_secret_hex.as_ref().map(|_| "[REDACTED]"),
            )
            .field("directory_seed", &self.directory_seed)
            .field("lock_timeout", &self.lock_timeout)
            .field("presence_refresh", &self.presence_refresh)
            .field("default_validity_hours", &self.default_validity_hours)
            .field("log_format", &self.log_format)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            credential_secret_hex: None,
            directory_seed: None,
            lock_timeout: Duration::from_millis(2_000),
            presence_refresh: Duration::from_secs(10),
            default_validity_hours: 24,
            log_format: LogFormat::Text,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = parse_or(get("PORT"), "PORT", defaults.port)?;
        let lock_timeout_ms = parse_or(get("LOCK_TIMEOUT_MS"), "LOCK_TIMEOUT_MS", 2_000u64)?;
        let refresh_secs = parse_or(get("PRESENCE_REFRESH_SECS"), "PRESENCE_REFRESH_SECS", 10u64)?;
        if refresh_secs == 0 {
            return Err(ConfigError {
                var: "PRESENCE_REFRESH_SECS",
                reason: "must be at least 1".into(),
            });
        }
        let default_validity_hours = parse_or(
            get("DEFAULT_VALIDITY_HOURS"),
            "DEFAULT_VALIDITY_HOURS",
            defaults.default_validity_hours,
        )?;
        if !(MIN_VALIDITY_HOURS..=MAX_VALIDITY_HOURS).contains(&default_validity_hours) {
            return Err(ConfigError {
                var: "DEFAULT_VALIDITY_HOURS",
                reason: format!(
                    "must be between {MIN_VALIDITY_HOURS} and {MAX_VALIDITY_HOURS}, got {default_validity_hours}"
                ),
            });
        }
        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    var: "LOG_FORMAT",
                    reason: format!("expected 'text' or 'json', got '{other}'"),
                })
            }
        };
        let max_requests = parse_or(
            get("RATE_LIMIT_PER_MINUTE"),
            "RATE_LIMIT_PER_MINUTE",
            defaults.rate_limit.max_requests,
        )?;
        let max_gates = parse_or(
            get("RATE_LIMIT_MAX_GATES"),
            "RATE_LIMIT_MAX_GATES",
            defaults.rate_limit.max_gates,
        )?;

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            credential_secret_hex: get("CREDENTIAL_SECRET_HEX").map(Zeroizing::new),
            directory_seed: get("DIRECTORY_SEED").map(PathBuf::from),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            presence_refresh: Duration::from_secs(refresh_secs),
            default_validity_hours,
            log_format,
            rate_limit: RateLimitConfig {
                max_requests,
                window_secs: 60,
                max_gates,
            },
        })
    }

    /// The engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_timeout: self.lock_timeout,
            default_validity_hours: self.default_validity_hours,
        }
    }
}

fn parse_or<T>(value: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            var,
            reason: format!("invalid value '{raw}': {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_none());
        assert!(config.credential_secret_hex.is_none());
        assert_eq!(config.lock_timeout, Duration::from_millis(2_000));
        assert_eq!(config.presence_refresh, Duration::from_secs(10));
        assert_eq!(config.default_validity_hours, 24);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn values_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("AUTH_TOKEN", "gate-secret"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("PRESENCE_REFRESH_SECS", "3"),
            ("DEFAULT_VALIDITY_HOURS", "12"),
            ("LOG_FORMAT", "JSON"),
            ("DIRECTORY_SEED", "/etc/gatehouse/directory.json"),
            ("RATE_LIMIT_PER_MINUTE", "30"),
            ("RATE_LIMIT_MAX_GATES", "64"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.auth_token.as_deref(), Some("gate-secret"));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.presence_refresh, Duration::from_secs(3));
        assert_eq!(config.engine_config().default_validity_hours, 12);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.rate_limit.max_gates, 64);
        assert!(config.directory_seed.is_some());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[("AUTH_TOKEN", "  "), ("PORT", "")])).unwrap();
        assert!(config.auth_token.is_none());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.var, "PORT");
        let err = AppConfig::from_lookup(lookup(&[("DEFAULT_VALIDITY_HOURS", "200")])).unwrap_err();
        assert_eq!(err.var, "DEFAULT_VALIDITY_HOURS");
        let err = AppConfig::from_lookup(lookup(&[("PRESENCE_REFRESH_SECS", "0")])).unwrap_err();
        assert_eq!(err.var, "PRESENCE_REFRESH_SECS");
        let err = AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).unwrap_err();
        assert_eq!(err.var, "LOG_FORMAT");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            auth_token: Some("super-secret-token".into()),
            credential_secret_hex: Some(Zeroizing::new("ab".repeat(32))),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(!debug.contains(&"ab".repeat(32)));
        assert!(debug.contains("[REDACTED]"));
    }
}

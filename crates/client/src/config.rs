//! Client runtime configuration
//!
//! Loaded from TOML, with a handful of environment overrides for the values
//! operators change most.
//!
//! ```toml
//! cache_ttl = "15s"
//! max_enrich_workers = 4
//! request_timeout = "1m"
//!
//! [task_backoff]
//! initial = "250ms"
//! max = "3s"
//! ```

use std::time::Duration;

use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use stratus_resilience::BackoffPolicy;

use crate::error::ConfigError;

/// Environment variable overriding [`ClientConfig::cache_ttl`]
pub const ENV_CACHE_TTL: &str = "STRATUS_CACHE_TTL";
/// Environment variable overriding [`ClientConfig::max_enrich_workers`]
pub const ENV_MAX_WORKERS: &str = "STRATUS_MAX_WORKERS";
/// Environment variable overriding [`ClientConfig::request_timeout`]
pub const ENV_REQUEST_TIMEOUT: &str = "STRATUS_REQUEST_TIMEOUT";
/// Environment variable overriding [`ClientConfig::accept_invalid_certs`]
pub const ENV_ACCEPT_INVALID_CERTS: &str = "STRATUS_ACCEPT_INVALID_CERTS";

/// Runtime configuration shared by every client a factory creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Lifetime of a cached resource snapshot
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Upper bound on concurrent address lookups per enrichment batch
    pub max_enrich_workers: usize,

    /// Poll cadence while waiting for tasks
    pub task_backoff: BackoffPolicy,

    /// Overall deadline for a task wait; none by default
    #[serde(with = "humantime_serde")]
    pub task_timeout: Option<Duration>,

    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Accept self-signed server certificates
    pub accept_invalid_certs: bool,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(10),
            max_enrich_workers: 10,
            task_backoff: BackoffPolicy::default(),
            task_timeout: None,
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
            user_agent: concat!("stratus/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with process environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CACHE_TTL) {
            self.cache_ttl = parse_duration(ENV_CACHE_TTL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_WORKERS) {
            self.max_enrich_workers = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Env {
                    var: ENV_MAX_WORKERS,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout = parse_duration(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_ACCEPT_INVALID_CERTS) {
            self.accept_invalid_certs = parse_bool(ENV_ACCEPT_INVALID_CERTS, &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_enrich_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_enrich_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "request_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                field: "task_timeout",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        self.task_backoff.validate()?;
        Ok(())
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.max_enrich_workers, 10);
        assert_eq!(config.task_backoff, BackoffPolicy::default());
        assert_eq!(config.task_timeout, None);
        assert!(config.accept_invalid_certs);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            cache_ttl = "15s"
            task_timeout = "2m"

            [task_backoff]
            initial = "250ms"
            max = "3s"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(15));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.task_backoff.initial, Duration::from_millis(250));
        assert_eq!(config.task_backoff.multiplier, 2.0);
        assert_eq!(config.max_enrich_workers, 10);
    }

    #[test]
    fn env_overrides_apply() {
        let config = ClientConfig::default()
            .with_env_lookup(lookup(&[
                (ENV_CACHE_TTL, "3s"),
                (ENV_MAX_WORKERS, "4"),
                (ENV_REQUEST_TIMEOUT, "500ms"),
                (ENV_ACCEPT_INVALID_CERTS, "false"),
            ]))
            .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(3));
        assert_eq!(config.max_enrich_workers, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(500));
        assert!(!config.accept_invalid_certs);
    }

    #[rstest]
    #[case(ENV_CACHE_TTL, "soon")]
    #[case(ENV_MAX_WORKERS, "many")]
    #[case(ENV_ACCEPT_INVALID_CERTS, "maybe")]
    fn bad_env_values_are_rejected(#[case] var: &'static str, #[case] value: &str) {
        let err = ClientConfig::default()
            .with_env_lookup(lookup(&[(var, value)]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: v, .. } if v == var));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let err = ClientConfig::from_toml_str("max_enrich_workers = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_enrich_workers",
                ..
            }
        ));
    }

    #[test]
    fn bad_backoff_is_invalid() {
        let err = ClientConfig::from_toml_str("[task_backoff]\nmultiplier = 0.5").unwrap_err();
        assert!(matches!(err, ConfigError::Backoff(_)));
    }
}

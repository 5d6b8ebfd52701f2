//! Environment configuration, read once at start-up.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use hrgate_observability::LogFormat;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_AUDIT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {variable}: {reason}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrGateConfig {
    /// Postgres URL; the in-memory stores are used when unset.
    pub database_url: Option<String>,
    /// Rule file replacing the built-in dependency/conflict rules.
    pub rules_path: Option<PathBuf>,
    pub cache_ttl: Duration,
    /// Reject assignments whose resulting permission set fails validation.
    pub enforce_validation: bool,
    pub audit_max_page_size: u32,
    pub log_format: LogFormat,
}

impl Default for HrGateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            rules_path: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            enforce_validation: true,
            audit_max_page_size: DEFAULT_AUDIT_MAX_PAGE_SIZE,
            log_format: LogFormat::Json,
        }
    }
}

impl HrGateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let cache_ttl = match get("HRGATE_CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_number("HRGATE_CACHE_TTL_SECS", &raw)?),
            None => defaults.cache_ttl,
        };

        let enforce_validation = match get("HRGATE_ENFORCE_VALIDATION") {
            Some(raw) => parse_flag("HRGATE_ENFORCE_VALIDATION", &raw)?,
            None => defaults.enforce_validation,
        };

        let audit_max_page_size = match get("HRGATE_AUDIT_MAX_PAGE_SIZE") {
            Some(raw) => {
                let size: u32 = parse_number("HRGATE_AUDIT_MAX_PAGE_SIZE", &raw)?;
                if size == 0 {
                    return Err(invalid("HRGATE_AUDIT_MAX_PAGE_SIZE", &raw, "must be at least 1"));
                }
                size
            }
            None => defaults.audit_max_page_size,
        };

        let log_format = match get("HRGATE_LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid("HRGATE_LOG_FORMAT", &raw, e.to_string()))?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            rules_path: get("HRGATE_RULES_PATH").map(PathBuf::from),
            cache_ttl,
            enforce_validation,
            audit_max_page_size,
            log_format,
        })
    }
}

fn invalid(variable: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        variable,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(variable, raw, e.to_string()))
}

fn parse_flag(variable: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(variable, raw, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<HrGateConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        HrGateConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        assert_eq!(config(&[]).unwrap(), HrGateConfig::default());
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/hrgate"),
            ("HRGATE_RULES_PATH", "/etc/hrgate/rules.json"),
            ("HRGATE_CACHE_TTL_SECS", "30"),
            ("HRGATE_ENFORCE_VALIDATION", "false"),
            ("HRGATE_AUDIT_MAX_PAGE_SIZE", "50"),
            ("HRGATE_LOG_FORMAT", "pretty"),
        ])
        .unwrap();

        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/hrgate"));
        assert_eq!(cfg.rules_path, Some(PathBuf::from("/etc/hrgate/rules.json")));
        assert_eq!(cfg.cache_ttl, Duration::from_secs(30));
        assert!(!cfg.enforce_validation);
        assert_eq!(cfg.audit_max_page_size, 50);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config(&[("HRGATE_CACHE_TTL_SECS", "soon")]).unwrap_err();
        assert_eq!(err.variable, "HRGATE_CACHE_TTL_SECS");

        let err = config(&[("HRGATE_ENFORCE_VALIDATION", "maybe")]).unwrap_err();
        assert_eq!(err.variable, "HRGATE_ENFORCE_VALIDATION");

        let err = config(&[("HRGATE_AUDIT_MAX_PAGE_SIZE", "0")]).unwrap_err();
        assert_eq!(err.variable, "HRGATE_AUDIT_MAX_PAGE_SIZE");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(cfg.database_url, None);
    }
}

//! Environment-provided runtime configuration. The core takes no config
//! files; everything operational arrives through the process environment.
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub user_agent: String,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: u32,
    pub pool_workers: usize,
    pub claim_batch_size: i64,
    pub poll_interval: Duration,
    pub scheduler_interval: Duration,
    pub scheduler_batch_size: i64,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name -> value lookup, so parsing stays
    /// testable without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Ok(Self {
            database_url,
            listen_addr: lookup("HYDROCARBON_LISTEN_ADDR")
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            user_agent: lookup("HYDROCARBON_USER_AGENT")
                .unwrap_or_else(|| "hydrocarbon-bot/1.0".to_string()),
            rate_limit_per_sec: parse(&lookup, "HYDROCARBON_RATE_LIMIT_PER_SEC", 4.0)?,
            rate_limit_burst: parse(&lookup, "HYDROCARBON_RATE_LIMIT_BURST", 8)?,
            pool_workers: parse(&lookup, "HYDROCARBON_WORKERS", default_workers)?,
            claim_batch_size: parse(&lookup, "HYDROCARBON_CLAIM_BATCH_SIZE", 10)?,
            poll_interval: Duration::from_secs(parse(
                &lookup,
                "HYDROCARBON_POLL_INTERVAL_SECONDS",
                5,
            )?),
            scheduler_interval: Duration::from_secs(parse(
                &lookup,
                "HYDROCARBON_SCHEDULER_INTERVAL_SECONDS",
                60,
            )?),
            scheduler_batch_size: parse(&lookup, "HYDROCARBON_SCHEDULER_BATCH_SIZE", 100)?,
            log_level: lookup("HYDROCARBON_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn dsn_is_required() {
        assert!(matches!(cfg(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn defaults_apply() {
        let c = cfg(&[("DATABASE_URL", "postgres://localhost/hydrocarbon")]).unwrap();
        assert_eq!(c.listen_addr, "127.0.0.1:8080");
        assert_eq!(c.rate_limit_per_sec, 4.0);
        assert_eq!(c.rate_limit_burst, 8);
        assert_eq!(c.poll_interval, Duration::from_secs(5));
        assert_eq!(c.scheduler_interval, Duration::from_secs(60));
    }

    #[test]
    fn overrides_parse() {
        let c = cfg(&[
            ("DATABASE_URL", "postgres://localhost/hydrocarbon"),
            ("HYDROCARBON_WORKERS", "2"),
            ("HYDROCARBON_RATE_LIMIT_PER_SEC", "0.5"),
        ])
        .unwrap();
        assert_eq!(c.pool_workers, 2);
        assert_eq!(c.rate_limit_per_sec, 0.5);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = cfg(&[
            ("DATABASE_URL", "postgres://localhost/hydrocarbon"),
            ("HYDROCARBON_WORKERS", "lots"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "HYDROCARBON_WORKERS",
                ..
            }
        ));
    }
}

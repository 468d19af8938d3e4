use std::path::PathBuf;
use std::time::Duration;

use crate::expiry::MonthOverflow;

/// Which `RecordStore` implementation backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(StoreBackend::File),
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => anyhow::bail!(
                "unknown store backend '{}'. Must be one of: file, postgres, memory",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    /// Path of the JSON file used by the `file` backend.
    pub data_file: PathBuf,
    /// Required when `store` is `postgres`.
    pub database_url: Option<String>,
    /// Upper bound for a single store call. Set via TOKENKEEPER_STORE_TIMEOUT_MS.
    pub store_timeout: Duration,
    /// Day-of-month overflow policy for timed activations.
    pub month_overflow: MonthOverflow,
    /// Interval of the expiry drift report. `None` disables the job.
    pub report_interval: Option<Duration>,
    pub dashboard_origin: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            store: StoreBackend::File,
            data_file: PathBuf::from("tokens.json"),
            database_url: None,
            store_timeout: Duration::from_millis(5000),
            month_overflow: MonthOverflow::RollOver,
            report_interval: None,
            dashboard_origin: "http://localhost:3000".into(),
            log_json: false,
        }
    }
}

impl Config {
    /// Returns the database URL, failing when the postgres backend is selected without one.
    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set when TOKENKEEPER_STORE=postgres"))
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a `Config` from an arbitrary key lookup. `load()` passes the process
/// environment; tests pass a map.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let store = match lookup("TOKENKEEPER_STORE") {
        Some(v) if !v.trim().is_empty() => v.parse()?,
        _ => defaults.store,
    };

    let month_overflow = match lookup("TOKENKEEPER_MONTH_OVERFLOW") {
        Some(v) if !v.trim().is_empty() => v.parse()?,
        _ => defaults.month_overflow,
    };

    let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
    if store == StoreBackend::Postgres && database_url.is_none() {
        anyhow::bail!("TOKENKEEPER_STORE=postgres requires DATABASE_URL to be set");
    }

    Ok(Config {
        port: lookup("TOKENKEEPER_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port),
        store,
        data_file: lookup("TOKENKEEPER_DATA_FILE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_file),
        database_url,
        store_timeout: lookup("TOKENKEEPER_STORE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .filter(|ms: &u64| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout),
        month_overflow,
        report_interval: lookup("TOKENKEEPER_REPORT_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs),
        dashboard_origin: lookup("DASHBOARD_ORIGIN").unwrap_or(defaults.dashboard_origin),
        log_json: lookup("TOKENKEEPER_LOG_JSON")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let cfg = from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.store, StoreBackend::File);
        assert_eq!(cfg.data_file, PathBuf::from("tokens.json"));
        assert_eq!(cfg.store_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.month_overflow, MonthOverflow::RollOver);
        assert!(cfg.report_interval.is_none());
        assert!(!cfg.log_json);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = from_lookup(lookup_from(&[("TOKENKEEPER_STORE", "postgres")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let cfg = from_lookup(lookup_from(&[
            ("TOKENKEEPER_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/tokenkeeper"),
        ]))
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.require_database_url().unwrap(), "postgres://localhost/tokenkeeper");
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        assert!(from_lookup(lookup_from(&[("TOKENKEEPER_STORE", "redis")])).is_err());
        assert!(from_lookup(lookup_from(&[("TOKENKEEPER_MONTH_OVERFLOW", "truncate")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let cfg = from_lookup(lookup_from(&[
            ("TOKENKEEPER_PORT", "8080"),
            ("TOKENKEEPER_STORE", "memory"),
            ("TOKENKEEPER_STORE_TIMEOUT_MS", "250"),
            ("TOKENKEEPER_MONTH_OVERFLOW", "clamp"),
            ("TOKENKEEPER_REPORT_INTERVAL_SECS", "60"),
            ("TOKENKEEPER_LOG_JSON", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert_eq!(cfg.month_overflow, MonthOverflow::Clamp);
        assert_eq!(cfg.report_interval, Some(Duration::from_secs(60)));
        assert!(cfg.log_json);
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let cfg = from_lookup(lookup_from(&[("TOKENKEEPER_STORE_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(cfg.store_timeout, Duration::from_millis(5000));
    }
}

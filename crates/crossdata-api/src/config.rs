//! # API Configuration
//!
//! Environment-based configuration for the analytics API service. Invalid
//! values fall back to their defaults and are reported as warnings once
//! logging is up.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

/// Where the exported tables live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBackend {
    /// A local directory laid out like the bucket.
    #[default]
    Local,
    /// The S3 bucket itself.
    S3,
}

impl FromStr for DataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown data backend '{other}'")),
        }
    }
}

/// Dataset location
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub backend: DataBackend,
    pub root: PathBuf,
    pub bucket: String,
    pub region: String,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Logging level, used when `RUST_LOG` is unset
    pub log_level: String,

    /// Dataset location
    pub data: DataConfig,

    /// Budget for a single table load
    pub load_timeout: Duration,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,

    /// Values that were rejected in favour of their defaults
    pub warnings: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut warnings = Vec::new();
        let parsed = |name: &str, default: &str| -> String {
            lookup(name).unwrap_or_else(|| default.to_string())
        };

        let server_addr = parse_or(&parsed("SERVER_ADDR", DEFAULT_SERVER_ADDR), "SERVER_ADDR", &mut warnings)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let backend: DataBackend = parse_or(&parsed("DATA_BACKEND", "local"), "DATA_BACKEND", &mut warnings).unwrap_or_default();

        let timeout_ms = parse_or(
            &parsed("LOAD_TIMEOUT_MS", &DEFAULT_LOAD_TIMEOUT_MS.to_string()),
            "LOAD_TIMEOUT_MS",
            &mut warnings,
        )
        .filter(|ms: &u64| *ms > 0)
        .unwrap_or(DEFAULT_LOAD_TIMEOUT_MS);

        Self {
            server_addr,
            log_level: parsed("LOG_LEVEL", "info"),
            data: DataConfig {
                backend,
                root: PathBuf::from(parsed("DATA_ROOT", "./data")),
                bucket: parsed("S3_BUCKET", "ingesta-de-datos"),
                region: parsed("AWS_DEFAULT_REGION", "us-east-1"),
            },
            load_timeout: Duration::from_millis(timeout_ms),
            cors_origins: parsed("CORS_ORIGINS", "*")
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            warnings,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(raw: &str, name: &str, warnings: &mut Vec<String>) -> Option<T> {
    raw.parse().map_or_else(
        |_| {
            warnings.push(format!("Invalid {name} '{raw}', using default"));
            None
        },
        Some,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.data.backend, DataBackend::Local);
        assert_eq!(config.data.bucket, "ingesta-de-datos");
        assert_eq!(config.load_timeout, Duration::from_secs(30));
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("DATA_BACKEND", "S3"),
            ("LOAD_TIMEOUT_MS", "500"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ]));
        assert_eq!(config.server_addr.port(), 9000);
        assert_eq!(config.data.backend, DataBackend::S3);
        assert_eq!(config.load_timeout, Duration::from_millis(500));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_invalid_values_fall_back_with_warnings() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "not-an-address"),
            ("DATA_BACKEND", "ftp"),
            ("LOAD_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.data.backend, DataBackend::Local);
        assert_eq!(config.load_timeout, Duration::from_secs(30));
        assert_eq!(config.warnings.len(), 3);
        assert!(config.warnings[0].contains("SERVER_ADDR"));
    }
}

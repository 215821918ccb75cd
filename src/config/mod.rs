use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use dotenvy::dotenv;
use serde::Deserialize;

/// Which storage backend the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub storage: StorageKind,

    /// Database connection URL, only read when `storage` is postgres
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first if one exists; values
    /// already present in the process environment win.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>().context("invalid configuration in environment")?;

        Ok(config)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            storage: StorageKind::default(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Load configuration, then let command-line flags override it.
pub fn init(overrides: impl FnOnce(&mut Config)) -> Result<Config> {
    let mut config = Config::load()?;
    overrides(&mut config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url().is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "5000"),
            ("STORAGE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/invoices"),
            ("LOG_FORMAT", "json"),
        ]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url(), Some("postgres://localhost/invoices"));
    }

    #[test]
    fn listen_addr_combines_host_and_port() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:3000");
    }
}

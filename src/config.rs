use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AnchorError, Result};

/// Env var naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "LOG_ANCHOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "log-anchor.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server: ServerConfig,
    pub batch: BatchConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub proofs: ProofsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub default_size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Http,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Upper bound on waiting for an anchor confirmation
    pub timeout_secs: u64,
    /// Block explorer base URL; transaction refs are appended to it
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofsConfig {
    /// Directory for exported proof files; no export when unset
    pub export_dir: Option<String>,
}

impl AppConfig {
    /// Defaults, then the TOML file named by `LOG_ANCHOR_CONFIG` (or
    /// `log-anchor.toml`) if it exists, then `LOG_ANCHOR__*` env vars
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(PathBuf::from(path)))
    }

    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("database_url", "sqlite://log-anchor.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000_i64)?
            .set_default("batch.default_size", 10_i64)?
            .set_default("batch.max_size", 1000_i64)?
            .set_default("ledger.backend", "memory")?
            .set_default("ledger.timeout_secs", 30_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("LOG_ANCHOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(AnchorError::Config("database_url must not be empty".to_string()));
        }
        if self.batch.max_size == 0 {
            return Err(AnchorError::Config("batch.max_size must be at least 1".to_string()));
        }
        if self.batch.default_size == 0 || self.batch.default_size > self.batch.max_size {
            return Err(AnchorError::Config(format!(
                "batch.default_size must be between 1 and {}",
                self.batch.max_size
            )));
        }
        if self.ledger.timeout_secs == 0 {
            return Err(AnchorError::Config("ledger.timeout_secs must be at least 1".to_string()));
        }
        if self.ledger.backend == LedgerBackend::Http {
            match self.ledger.endpoint.as_deref() {
                Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {}
                Some(endpoint) => {
                    return Err(AnchorError::Config(format!(
                        "ledger.endpoint must be an http(s) URL, got {}",
                        endpoint
                    )))
                }
                None => {
                    return Err(AnchorError::Config(
                        "ledger.endpoint is required for the http backend".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn defaults() -> AppConfig {
        AppConfig::load_from(None).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = defaults();
        assert_eq!(config.database_url, "sqlite://log-anchor.db");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.batch.default_size, 10);
        assert_eq!(config.batch.max_size, 1000);
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.ledger_timeout(), Duration::from_secs(30));
        assert!(config.proofs.export_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
database_url = "sqlite::memory:"

[batch]
default_size = 25

[ledger]
backend = "http"
endpoint = "https://ledger.example.org"
explorer_url = "https://hoodi.etherscan.io/tx"

[proofs]
export_dir = "proofs"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.batch.default_size, 25);
        assert_eq!(config.batch.max_size, 1000);
        assert_eq!(config.ledger.backend, LedgerBackend::Http);
        assert_eq!(config.proofs.export_dir.as_deref(), Some("proofs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config = AppConfig::load_from(Some(PathBuf::from("/nonexistent/log-anchor.toml"))).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validation_rules() {
        let mut config = defaults();
        config.batch.default_size = 0;
        assert!(config.validate().is_err());

        let mut config = defaults();
        config.batch.default_size = 2000;
        assert!(config.validate().is_err());

        let mut config = defaults();
        config.ledger.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = defaults();
        config.ledger.backend = LedgerBackend::Http;
        assert!(config.validate().is_err());
        config.ledger.endpoint = Some("ftp://ledger".to_string());
        assert!(config.validate().is_err());
        config.ledger.endpoint = Some("http://localhost:8545".to_string());
        assert!(config.validate().is_ok());
    }
}

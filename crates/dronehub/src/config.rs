//! Configuration management for dronehub.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::PageRequest;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "dronehub";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "dronehub.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `DRONEHUB_`)
/// 2. TOML config file at `~/.config/dronehub/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// API behaviour.
    pub api: ApiConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/dronehub/dronehub.db`
    pub database_path: Option<PathBuf>,
    /// How long a write waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

/// Pagination settings for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Page size when the caller gives no `limit`.
    pub default_page_size: u64,
    /// Largest `limit` honoured; larger values are clamped.
    pub max_page_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1_000,
        }
    }
}

impl ApiConfig {
    /// Turn optional `skip`/`limit` query values into a clamped window.
    #[must_use]
    pub fn page(&self, skip: Option<i64>, limit: Option<i64>) -> PageRequest {
        let default_limit = i64::try_from(self.default_page_size).unwrap_or(i64::MAX);
        PageRequest::clamped(
            skip.unwrap_or(0),
            limit.unwrap_or(default_limit),
            self.max_page_size,
        )
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `DRONEHUB_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("DRONEHUB_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.host must not be empty".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.api.max_page_size == 0 {
            return Err(Error::ConfigValidation {
                message: "max_page_size must be greater than 0".to_string(),
            });
        }

        if self.api.default_page_size > self.api.max_page_size {
            return Err(Error::ConfigValidation {
                message: format!(
                    "default_page_size ({}) cannot be greater than max_page_size ({})",
                    self.api.default_page_size, self.api.max_page_size
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the busy timeout as a Duration.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert!(config.storage.database_path.is_none());
        assert_eq!(config.api.default_page_size, 100);
        assert_eq!(config.api.max_page_size, 1_000);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = Config::default();
        config.server.host = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.host"));
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
    }

    #[test]
    fn test_validate_zero_max_page_size() {
        let mut config = Config::default();
        config.api.max_page_size = 0;
        config.api.default_page_size = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_page_size"));
    }

    #[test]
    fn test_validate_default_exceeds_max() {
        let mut config = Config::default();
        config.api.default_page_size = 500;
        config.api.max_page_size = 50;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("default_page_size"));
    }

    #[test]
    fn test_page_defaults_and_clamping() {
        let api = ApiConfig::default();

        assert_eq!(api.page(None, None), PageRequest::new(0, 100));
        assert_eq!(api.page(Some(20), Some(5)), PageRequest::new(20, 5));
        assert_eq!(api.page(Some(-3), Some(1_000_000)), PageRequest::new(0, 1_000));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("dronehub.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_busy_timeout() {
        assert_eq!(Config::default().busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_server_address() {
        assert_eq!(Config::default().server_address(), "127.0.0.1:8000");
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("dronehub"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9100\n\n[api]\nmax_page_size = 250\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.api.max_page_size, 250);
        assert_eq!(config.api.default_page_size, 100);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nmax_page_size = 10\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(err.to_string().contains("default_page_size"));
    }

    #[test]
    fn test_api_config_deserialize_partial() {
        let api: ApiConfig = serde_json::from_str(r#"{"max_page_size": 50}"#).unwrap();
        assert_eq!(api.max_page_size, 50);
        assert_eq!(api.default_page_size, 100);
    }
}

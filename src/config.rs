//! Application configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use tracing::warn;

use crate::errors::AcarsRecorderError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub listener: ListenerConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub bind: SocketAddr,
    /// Link-test and housekeeping labels that are never stored
    #[serde(default = "default_ignored_labels")]
    pub ignored_labels: Vec<String>,
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub bind: SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub block_size: usize,
    /// Offset of the local time column from UTC
    pub local_offset_minutes: i32,
    pub local_zone_name: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatasetConfig {
    /// Directory with the label, airline and aircraft tables
    pub dir: Option<PathBuf>,
}

fn default_ignored_labels() -> Vec<String> {
    vec!["_d".to_string(), "Q0".to_string(), "SQ".to_string()]
}

fn default_max_datagram_size() -> usize {
    65_535
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            block_size: crate::export::DEFAULT_BLOCK_SIZE,
            local_offset_minutes: 0,
            local_zone_name: "UTC".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("listener.bind", "0.0.0.0:16009")?
            .set_default("http.bind", "0.0.0.0:16010")?
            .set_default("database.path", "acars.db")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("ACARSRECORDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("listener.ignored_labels"),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        self.listener.validate()?;
        self.database.validate()?;
        self.export.validate()?;
        Ok(())
    }
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        if self.max_datagram_size == 0 {
            return Err(AcarsRecorderError::ConfigurationError {
                message: "Maximum datagram size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        self.validate_path()?;
        self.validate_max_connections()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_directory_exists(parent)?;
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), AcarsRecorderError> {
        if self.path.as_os_str().is_empty() {
            return Err(AcarsRecorderError::ConfigurationError {
                message: "Database path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn validate_max_connections(&self) -> Result<(), AcarsRecorderError> {
        if self.max_connections == 0 {
            return Err(AcarsRecorderError::ConfigurationError {
                message: "Database connections must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), AcarsRecorderError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| AcarsRecorderError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        if self.block_size == 0 {
            return Err(AcarsRecorderError::ConfigurationError {
                message: "Export block size must be greater than zero".to_string(),
            });
        }
        self.local_offset()?;
        Ok(())
    }

    pub fn local_offset(&self) -> Result<FixedOffset, AcarsRecorderError> {
        FixedOffset::east_opt(self.local_offset_minutes * 60).ok_or_else(|| {
            AcarsRecorderError::ConfigurationError {
                message: format!(
                    "Local offset of {} minutes is out of range",
                    self.local_offset_minutes
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("ACARSRECORDER__LISTENER__BIND", "127.0.0.1:5555");
        env::set_var("ACARSRECORDER__LISTENER__IGNORED_LABELS", "_d,SQ");
        env::set_var("ACARSRECORDER__DATABASE__PATH", "/tmp/acars-test.db");
        env::set_var("ACARSRECORDER__DATABASE__BUSY_TIMEOUT", "10");
        env::set_var("ACARSRECORDER__HTTP__BIND", "127.0.0.1:8080");
        env::set_var("ACARSRECORDER__EXPORT__BLOCK_SIZE", "500");
        env::set_var("ACARSRECORDER__EXPORT__LOCAL_OFFSET_MINUTES", "540");
        env::set_var("ACARSRECORDER__EXPORT__LOCAL_ZONE_NAME", "JST");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.listener.bind, "127.0.0.1:5555".parse::<SocketAddr>().unwrap());
        assert_eq!(config.listener.ignored_labels, vec!["_d", "SQ"]);
        assert_eq!(config.listener.max_datagram_size, 65_535);
        assert_eq!(config.database.path, PathBuf::from("/tmp/acars-test.db"));
        assert_eq!(config.database.busy_timeout, Duration::from_secs(10));
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.http.bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.export.block_size, 500);
        assert_eq!(
            config.export.local_offset().unwrap(),
            FixedOffset::east_opt(9 * 3600).unwrap()
        );
        assert!(config.dataset.dir.is_none());
    }

    fn database_config(path: &str, max_connections: u32) -> DatabaseConfig {
        DatabaseConfig {
            path: PathBuf::from(path),
            max_connections,
            busy_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_database_config_validate() {
        assert!(database_config("/tmp/acars.db", 4).validate().is_ok());
        assert!(database_config("acars.db", 4).validate().is_ok());
    }

    #[test]
    fn test_database_config_validate_invalid_path() {
        assert!(database_config("", 4).validate().is_err());
    }

    #[test]
    fn test_database_config_validate_invalid_connections() {
        assert!(database_config("/tmp/acars.db", 0).validate().is_err());
    }

    #[test]
    fn test_export_config_validate() {
        let mut config = ExportConfig::default();
        assert!(config.validate().is_ok());

        config.block_size = 0;
        assert!(config.validate().is_err());

        config.block_size = 10;
        config.local_offset_minutes = 25 * 60;
        assert!(config.validate().is_err());
    }
}

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::notifications::ChannelConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RouterApiConfig {
    pub port: u16,
    pub timeout_secs: u64,
    pub attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for RouterApiConfig {
    fn default() -> Self {
        Self {
            port: crate::routeros::DEFAULT_API_PORT,
            timeout_secs: 5,
            attempts: 3,
            retry_delay_secs: 1,
        }
    }
}

impl RouterApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CoaConfig {
    /// Path to the external Disconnect-Request client (FreeRADIUS `radclient`).
    pub client_path: String,
    pub port: u16,
    pub retries: u32,
    pub timeout_secs: u64,
}

impl Default for CoaConfig {
    fn default() -> Self {
        Self {
            client_path: "radclient".to_string(),
            port: 1700,
            retries: 3,
            timeout_secs: 3,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub cache_ttl_secs: u64,
    /// Devices polled at once when aggregating.
    pub concurrency: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 30,
            concurrency: 8,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ZtpConfig {
    pub sweep_interval_secs: u64,
    pub sweep_concurrency: usize,
}

impl Default for ZtpConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            sweep_concurrency: 4,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FupConfig {
    pub check_interval_secs: u64,
}

impl Default for FupConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 900,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub radius_database_url: Option<String>,
    pub log_dir: String,
    pub router_api: RouterApiConfig,
    pub coa: CoaConfig,
    pub monitoring: MonitoringConfig,
    pub ztp: ZtpConfig,
    pub fup: FupConfig,
    pub notification_channels: Vec<ChannelConfig>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAppConfig {
    database_url: Option<String>,
    radius_database_url: Option<String>,
    log_dir: Option<String>,
    router_api: Option<RouterApiConfig>,
    coa: Option<CoaConfig>,
    monitoring: Option<MonitoringConfig>,
    ztp: Option<ZtpConfig>,
    fup: Option<FupConfig>,
    #[serde(default)]
    notification_channels: Vec<ChannelConfig>,
}

/// Environment only carries the top-level scalars.
#[derive(Deserialize, Default, Debug)]
struct EnvAppConfig {
    database_url: Option<String>,
    radius_database_url: Option<String>,
    log_dir: Option<String>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let env_config: EnvAppConfig = envy::from_env()?;
        Self::merge(read_file(config_path)?, env_config)
    }

    fn merge(file_config: PartialAppConfig, env_config: EnvAppConfig) -> Result<Self, ConfigError> {
        Ok(AppConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            radius_database_url: env_config
                .radius_database_url
                .or(file_config.radius_database_url),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            router_api: file_config.router_api.unwrap_or_default(),
            coa: file_config.coa.unwrap_or_default(),
            monitoring: file_config.monitoring.unwrap_or_default(),
            ztp: file_config.ztp.unwrap_or_default(),
            fup: file_config.fup.unwrap_or_default(),
            notification_channels: file_config.notification_channels,
        })
    }

    /// The RADIUS schema database, which defaults to the application database.
    pub fn radius_database_url(&self) -> &str {
        self.radius_database_url
            .as_deref()
            .unwrap_or(&self.database_url)
    }
}

fn read_file(config_path: Option<&str>) -> Result<PartialAppConfig, ConfigError> {
    let Some(path_str) = config_path else {
        return Ok(PartialAppConfig::default());
    };
    let path = Path::new(path_str);
    if !path.exists() {
        return Ok(PartialAppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_str.to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path_str.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_fill_sections_and_env_overrides_scalars() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_url = "postgres://file/app"
log_dir = "/var/log/ispnexus"

[router_api]
timeout_secs = 10

[ztp]
sweep_concurrency = 8

[monitoring]
concurrency = 16

[[notification_channels]]
type = "webhook"
method = "POST"
url = "https://hooks.example.net/noc"
"#
        )
        .unwrap();

        let file_config = read_file(file.path().to_str()).unwrap();
        let env_config = EnvAppConfig {
            database_url: Some("postgres://env/app".to_string()),
            ..Default::default()
        };
        let config = AppConfig::merge(file_config, env_config).unwrap();

        assert_eq!(config.database_url, "postgres://env/app");
        assert_eq!(config.radius_database_url(), "postgres://env/app");
        assert_eq!(config.log_dir, "/var/log/ispnexus");
        assert_eq!(config.router_api.timeout_secs, 10);
        assert_eq!(config.router_api.port, 8728);
        assert_eq!(config.router_api.attempts, 3);
        assert_eq!(config.ztp.sweep_concurrency, 8);
        assert_eq!(config.ztp.sweep_interval_secs, 300);
        assert_eq!(config.coa.port, 1700);
        assert_eq!(config.monitoring.cache_ttl_secs, 30);
        assert_eq!(config.monitoring.concurrency, 16);

        let defaults = AppConfig::merge(
            PartialAppConfig {
                database_url: Some("postgres://file/app".to_string()),
                ..Default::default()
            },
            EnvAppConfig::default(),
        )
        .unwrap();
        assert_eq!(defaults.monitoring.concurrency, 8);
        assert_eq!(defaults.ztp.sweep_concurrency, 4);
        assert_eq!(config.notification_channels.len(), 1);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let result = AppConfig::merge(PartialAppConfig::default(), EnvAppConfig::default());
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
        assert!(read_file(Some("/nonexistent/ispnexus.toml")).is_ok());
    }
}

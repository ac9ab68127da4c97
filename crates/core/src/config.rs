//! Configuration management for ltd-conveyor

use crate::error::{Error, Result};
use crate::store::{BucketOptions, StoreCredentials};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration directory name
const CONFIG_DIR: &str = "ltd-conveyor";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// LTD Keeper host used when none is configured
pub const DEFAULT_KEEPER_HOST: &str = "https://keeper.lsst.codes";

/// Accepted values of `logging.level` and `--log-level`
pub const LOG_LEVELS: [&str; 3] = ["warning", "info", "debug"];

/// Main configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub keeper: Option<KeeperConfig>,
    pub aws: Option<AwsConfig>,
    pub fastly: Option<FastlyConfig>,
    pub logging: Option<LoggingConfig>,
}

/// LTD Keeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Organization slug, needed by v2 servers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

/// AWS S3 configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    // Access key pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    // OR a named profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    /// Credentials described by this section, if it describes any
    pub fn credentials(&self) -> Option<StoreCredentials> {
        match (&self.access_key_id, &self.secret_access_key, &self.profile) {
            (Some(id), Some(secret), _) => Some(StoreCredentials::KeyPair {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            (_, _, Some(profile)) => Some(StoreCredentials::Profile(profile.clone())),
            _ => None,
        }
    }

    pub fn bucket_options(&self) -> BucketOptions {
        BucketOptions {
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
    }
}

/// Fastly configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FastlyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_host() -> String {
    DEFAULT_KEEPER_HOST.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
    Ok(home.join(".config").join(CONFIG_DIR))
}

/// Get the configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Load configuration from the default location
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from `config_path`
pub fn load_config_from(config_path: &Path) -> Result<ConfigFile> {
    if !config_path.exists() {
        return Err(Error::ConfigNotFound(config_path.to_path_buf()));
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file: {}", e))
    })?;

    let config: ConfigFile = toml::from_str(&content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config file: {}", e))
    })?;

    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ConfigFile) -> Result<()> {
    if let Some(keeper) = &config.keeper {
        if !(keeper.host.starts_with("http://") || keeper.host.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "LTD Keeper host must be an http(s) URL, got {}",
                keeper.host
            )));
        }
    }

    if let Some(aws) = &config.aws {
        let has_key_id = aws.access_key_id.is_some();
        let has_secret = aws.secret_access_key.is_some();

        if has_key_id != has_secret {
            return Err(Error::Config(
                "Both access_key_id and secret_access_key must be set".to_string(),
            ));
        }
        if has_key_id && aws.profile.is_some() {
            return Err(Error::Config(
                "Set either profile or access_key_id + secret_access_key, not both".to_string(),
            ));
        }
    }

    if let Some(logging) = &config.logging {
        if !LOG_LEVELS.contains(&logging.level.as_str()) {
            return Err(Error::InvalidInput(format!(
                "Invalid log level {} (expected one of {})",
                logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
    }

    Ok(())
}

/// Check if configuration exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

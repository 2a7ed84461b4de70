//! Configuration resolution for digger-analyzer
//!
//! Priority: command line / environment → TOML → compiled defaults.

use digger_common::config::{
    default_config_path, load_toml_config, TomlConfig, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SERVICE_URL,
};
use digger_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Module name, also the TOML file stem
pub const MODULE_NAME: &str = "digger-analyzer";

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub service_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub input_device: Option<String>,
    pub log_level: Option<String>,
}

/// Resolved analyzer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub port: u16,
    pub service_url: String,
    pub request_timeout: Duration,
    /// Input device name (None = default device)
    pub input_device: Option<String>,
    pub log_level: String,
}

impl AnalyzerConfig {
    /// Merge overrides over a TOML config over the defaults
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Result<Self> {
        let service_url = overrides
            .service_url
            .or(toml.service_url)
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        if service_url.trim().is_empty() {
            return Err(Error::Config("service_url must not be empty".to_string()));
        }

        let timeout_secs = overrides
            .request_timeout_secs
            .or(toml.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            service_url,
            request_timeout: Duration::from_secs(timeout_secs),
            input_device: overrides.input_device.or(toml.input_device),
            log_level: overrides.log_level.unwrap_or(toml.logging.level),
        })
    }

    /// Load the TOML file (explicit path or the default location) and resolve
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let path: Option<PathBuf> = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(MODULE_NAME),
        };

        let toml = match &path {
            Some(path) => load_toml_config(path)?,
            None => {
                info!("No config directory on this platform, using defaults");
                TomlConfig::default()
            }
        };

        Self::resolve(overrides, toml)
    }
}

//! Configuration file loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments / environment variables (resolved by each binary)
//! 2. TOML configuration file
//! 3. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and the compiled
//! defaults apply. A file that exists but does not parse is a configuration
//! error, since silently ignoring it would hide a typo.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application folder name under the platform config directory
pub const APP_DIR_NAME: &str = "crate-digger";

/// Default HTTP port of the analyzer service
pub const DEFAULT_PORT: u16 = 5780;

/// Default base URL of the identification / sample lookup service
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";

/// Default timeout applied to each remote call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional so that partial files work; unset fields fall back
/// to CLI/environment values or compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Base URL of the analysis service (e.g. "http://localhost:8000")
    #[serde(default)]
    pub service_url: Option<String>,

    /// Per-request timeout for remote calls, in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Capture device name (None = platform default input)
    #[serde(default)]
    pub input_device: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default location of a module's TOML file
///
/// `<config dir>/crate-digger/<module_name>.toml`, e.g.
/// `~/.config/crate-digger/digger-analyzer.toml` on Linux.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(format!("{}.toml", module_name)))
}

/// Load a TOML configuration file
///
/// Returns defaults (with a warning) when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;

    let config = parse_toml_config(&content)
        .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse TOML text into a [`TomlConfig`]
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    let config: TomlConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    if let Some(url) = &config.service_url {
        if url.trim().is_empty() {
            return Err(Error::Config("service_url must not be empty".to_string()));
        }
    }

    if config.request_timeout_secs == Some(0) {
        return Err(Error::Config(
            "request_timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(config)
}

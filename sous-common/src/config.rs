//! Configuration loading for Sous services
//!
//! Service-level settings come from a TOML file with per-field defaults, so a
//! partial file (or none at all) still yields a working configuration. The
//! log level can additionally be overridden through `SOUS_LOG` for quick
//! diagnostics without touching the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable overriding the configured log level
pub const LOG_LEVEL_ENV: &str = "SOUS_LOG";

/// Service-level configuration shared by Sous binaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Event bus channel capacity
    pub event_capacity: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter ("trace", "debug", "info", "warn", "error")
    pub level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            event_capacity: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Effective log level: `SOUS_LOG` when set, configured level otherwise
    pub fn log_level(&self) -> String {
        std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| self.logging.level.clone())
    }
}

/// Load service configuration from a TOML file
///
/// A missing file yields the defaults; a malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<ServiceConfig> {
    if !path.exists() {
        info!("Config file {} not found, using defaults", path.display());
        return Ok(ServiceConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Write service configuration to a TOML file
pub fn write_toml_config(path: &Path, config: &ServiceConfig) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.event_capacity, 100);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_toml_config(Path::new("/nonexistent/sous.toml"))
            .expect("missing file should yield defaults");
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ServiceConfig =
            toml::from_str("[logging]\nlevel = \"debug\"\n").expect("partial config should parse");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.event_capacity, 100, "unset fields should default");
    }
}

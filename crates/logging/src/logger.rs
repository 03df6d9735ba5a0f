//! Global subscriber installation

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use common::types::LogLevel;
use config::ConfigManager;

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Reads logging settings from the configuration manager
    pub fn from_config(config_manager: &ConfigManager) -> Self {
        let defaults = Self::default();

        let level = config_manager
            .get_string("log_level")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(defaults.level);

        let json = config_manager.get_bool("log_json").unwrap_or(defaults.json);

        Self { level, json }
    }

    /// Builds the filter, letting `RUST_LOG` take precedence
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Installs the process-wide subscriber
pub struct Logger;

impl Logger {
    /// Initializes logging
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(config: &LoggingConfig) -> Result<()> {
        let filter = config.env_filter();

        let result = if config.json {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
        } else {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
        };

        result.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
    }

    /// Initializes logging, tolerating an already installed subscriber
    pub fn try_init(config: &LoggingConfig) {
        if let Err(e) = Self::init(config) {
            warn!("{}", e);
        }
    }
}

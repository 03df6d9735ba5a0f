//! Configuration manager
//!
//! This module provides the `ConfigManager`, a thread-safe view over the
//! layered configuration: built-in defaults, then an optional file, then
//! environment variables, then runtime overrides.

use std::path::Path;
use std::time::Duration;
use anyhow::Result as AnyResult;
use parking_lot::RwLock;
use tracing::{debug, info};

use common::error::{Error, Result};
use config_rs::{Config, Environment, File};

use crate::defaults::{DefaultConfig, DefaultValue, ENV_PREFIX};

/// Configuration manager
pub struct ConfigManager {
    /// Merged configuration
    config: RwLock<Config>,
}

impl ConfigManager {
    /// Creates a configuration manager from defaults and the environment
    pub fn new() -> AnyResult<Self> {
        Self::build(None)
    }

    /// Creates a configuration manager that also reads the given file
    pub fn from_file(path: impl AsRef<Path>) -> AnyResult<Self> {
        Self::build(Some(path.as_ref()))
    }

    /// Creates a configuration manager from defaults plus the given overrides
    ///
    /// The environment is not consulted, which keeps tests hermetic.
    pub fn with_overrides(overrides: &[(&str, &str)]) -> AnyResult<Self> {
        let mut builder = Self::defaults_builder()?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        Ok(Self {
            config: RwLock::new(builder.build()?),
        })
    }

    fn defaults_builder() -> AnyResult<config_rs::ConfigBuilder<config_rs::builder::DefaultState>> {
        let mut builder = Config::builder();
        for (key, value) in DefaultConfig::default().entries() {
            builder = match value {
                DefaultValue::Int(v) => builder.set_default(key, v)?,
                DefaultValue::Str(v) => builder.set_default(key, v)?,
                DefaultValue::Bool(v) => builder.set_default(key, v)?,
            };
        }
        Ok(builder)
    }

    fn build(path: Option<&Path>) -> AnyResult<Self> {
        let mut builder = Self::defaults_builder()?;

        if let Some(path) = path {
            info!("Loading configuration from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        Ok(Self {
            config: RwLock::new(builder.build()?),
        })
    }

    /// Gets a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.config
            .read()
            .get_string(key)
            .map_err(|e| Error::Config(format!("{}: {}", key, e)))
    }

    /// Gets an unsigned integer value
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let value = self
            .config
            .read()
            .get_int(key)
            .map_err(|e| Error::Config(format!("{}: {}", key, e)))?;

        u64::try_from(value).map_err(|_| Error::Config(format!("{}: must not be negative", key)))
    }

    /// Gets a size value
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.get_u64(key)?;
        usize::try_from(value).map_err(|_| Error::Config(format!("{}: value too large", key)))
    }

    /// Gets a boolean value
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.config
            .read()
            .get_bool(key)
            .map_err(|e| Error::Config(format!("{}: {}", key, e)))
    }

    /// Gets a duration value expressed in milliseconds
    pub fn get_duration(&self, key: &str) -> Result<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }

    /// Overrides a value at runtime
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut config = self.config.write();

        let updated = Config::builder()
            .add_source(config.clone())
            .set_override(key, value)
            .and_then(|builder| builder.build())
            .map_err(|e| Error::Config(format!("{}: {}", key, e)))?;

        *config = updated;

        debug!("Configuration key {} overridden", key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let manager = ConfigManager::with_overrides(&[]).unwrap();
        assert_eq!(manager.get_usize("threads_per_queue").unwrap(), 1);
        assert_eq!(manager.get_usize("max_queue_len").unwrap(), 1024);
        assert_eq!(manager.get_duration("idle_batch_linger_ms").unwrap(), Duration::ZERO);
        assert_eq!(manager.get_string("log_level").unwrap(), "info");
        assert!(!manager.get_bool("log_json").unwrap());
    }

    #[test]
    fn test_overrides_and_set() {
        let manager = ConfigManager::with_overrides(&[("threads_per_queue", "3")]).unwrap();
        assert_eq!(manager.get_usize("threads_per_queue").unwrap(), 3);

        manager.set("idle_batch_linger_ms", "25").unwrap();
        assert_eq!(manager.get_duration("idle_batch_linger_ms").unwrap(), Duration::from_millis(25));
    }

    #[test]
    fn test_missing_and_negative_values() {
        let manager = ConfigManager::with_overrides(&[("max_queue_len", "-1")]).unwrap();
        assert!(matches!(manager.get_u64("max_queue_len"), Err(Error::Config(_))));
        assert!(matches!(manager.get_string("no_such_key"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_queue_len = 16").unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();

        let manager = ConfigManager::from_file(file.path()).unwrap();
        assert_eq!(manager.get_usize("max_queue_len").unwrap(), 16);
        assert_eq!(manager.get_string("log_level").unwrap(), "debug");
        assert_eq!(manager.get_usize("threads_per_queue").unwrap(), 1);
    }
}

//! Simulcast switching configuration

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of next-layer packets that must be seen before switching,
/// calibrated for the base layer.
pub const DEFAULT_MIN_NEXT_SEEN: i32 = 125;

/// Configuration key holding the hysteresis threshold, the path of
/// [`SwitchingConfig::min_next_seen`] in the loaded configuration
pub const MIN_NEXT_SEEN_KEY: &str = "switching.min_next_seen";

/// Source of integer tuning values looked up by key
pub trait ThresholdProvider: Send + Sync {
    /// Returns the value stored under `key`, or `default` when absent or invalid
    fn get_int(&self, key: &str, default: i32) -> i32;
}

impl ThresholdProvider for config::Config {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        match config::Config::get_int(self, key) {
            Ok(value) => i32::try_from(value).unwrap_or_else(|_| {
                tracing::warn!(key, value, "Threshold out of range, using default");
                default
            }),
            Err(ConfigError::NotFound(_)) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "Invalid threshold, using default");
                default
            }
        }
    }
}

/// Simulcast configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulcastConfig {
    pub switching: SwitchingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchingConfig {
    /// Packets of the next layer to see before switching to it
    /// (scaled by `2^order` for upper layers)
    pub min_next_seen: i32,
}

impl Default for SwitchingConfig {
    fn default() -> Self {
        Self {
            min_next_seen: DEFAULT_MIN_NEXT_SEEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
    /// Log every admission decision at trace level
    pub packet_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
            packet_trace: false,
        }
    }
}

impl SimulcastConfig {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_raw(config_file)?.try_deserialize()
    }

    /// Merge the same sources as [`load`](Self::load) without deserializing,
    /// for use as a [`ThresholdProvider`]
    pub fn load_raw(config_file: Option<&str>) -> Result<config::Config, ConfigError> {
        Self::builder(config_file).build()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    fn builder(config_file: Option<&str>) -> config::ConfigBuilder<config::builder::DefaultState> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // SYNCTV__SWITCHING__MIN_NEXT_SEEN, etc.
        builder.add_source(
            Environment::with_prefix("SYNCTV")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }
}

impl ThresholdProvider for SimulcastConfig {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        match key {
            MIN_NEXT_SEEN_KEY => self.switching.min_next_seen,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulcastConfig::default();
        assert_eq!(config.switching.min_next_seen, DEFAULT_MIN_NEXT_SEEN);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.logging.packet_trace);
    }

    #[test]
    fn test_simulcast_config_provider() {
        let mut config = SimulcastConfig::default();
        config.switching.min_next_seen = 40;

        assert_eq!(config.get_int(MIN_NEXT_SEEN_KEY, 125), 40);
        assert_eq!(config.get_int("simulcast.unknown", 7), 7);
    }

    #[test]
    fn test_config_crate_provider() {
        let config = ConfigBuilder::builder()
            .set_override(MIN_NEXT_SEEN_KEY, 60)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(ThresholdProvider::get_int(&config, MIN_NEXT_SEEN_KEY, 125), 60);
        assert_eq!(ThresholdProvider::get_int(&config, "missing.key", 125), 125);
    }

    #[test]
    fn test_config_crate_provider_rejects_garbage() {
        let config = ConfigBuilder::builder()
            .set_override(MIN_NEXT_SEEN_KEY, "lots")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(ThresholdProvider::get_int(&config, MIN_NEXT_SEEN_KEY, 125), 125);
    }

    #[test]
    fn test_raw_config_finds_threshold_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulcast.toml");
        std::fs::write(&path, "[switching]\nmin_next_seen = 9\n").unwrap();
        let path = path.to_str().unwrap();

        let raw = SimulcastConfig::load_raw(Some(path)).unwrap();
        let typed = SimulcastConfig::load(Some(path)).unwrap();

        assert_eq!(ThresholdProvider::get_int(&raw, MIN_NEXT_SEEN_KEY, 125), 9);
        assert_eq!(typed.get_int(MIN_NEXT_SEEN_KEY, 125), 9);
    }

    #[test]
    fn test_load_without_file() {
        // A missing file is skipped, leaving defaults and environment overrides
        assert!(SimulcastConfig::load(Some("does-not-exist.toml")).is_ok());
    }
}

//! Configuration management for the smsburst service.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use smsburst_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("smsburst.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use smsburst_domain::normalize::{DEFAULT_COUNTRY_PREFIX, DEFAULT_TRUNK_PREFIX};
use smsburst_domain::{
    CoalescerConfig, IdentityNormalizer, PhoneNumberNormalizer, WindowPolicy,
    DEFAULT_ADMISSION_CAPACITY,
};

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Batching settings
    #[serde(default)]
    pub coalescer: CoalescerSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Batching settings.
///
/// Environment variables use the `SMSBURST_` prefix and `__` as the nested
/// key separator:
///
/// - `SMSBURST_COALESCER__WINDOW_DURATION_SECS=30`
/// - `SMSBURST_COALESCER__WINDOW_POLICY=sliding`
/// - `SMSBURST_COALESCER__KEY_NORMALIZATION=phone`
///
/// # Example YAML Configuration
///
/// ```yaml
/// coalescer:
///   window_duration_secs: 60
///   window_policy: tumbling
///   admission_cache_capacity: 1000
///   key_normalization: phone
///   phone_country_prefix: "+63"
///   phone_trunk_prefix: "0"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CoalescerSettings {
    /// Window length in seconds.
    #[serde(default = "default_window_duration_secs")]
    pub window_duration_secs: u64,

    /// "tumbling" (fixed deadline) or "sliding" (deadline moves with each event).
    #[serde(default = "default_window_policy")]
    pub window_policy: String,

    /// Number of distinct event ids remembered for duplicate suppression.
    #[serde(default = "default_admission_cache_capacity")]
    pub admission_cache_capacity: usize,

    /// Key normalization: "identity" or "phone".
    #[serde(default = "default_key_normalization")]
    pub key_normalization: String,

    /// International prefix rewritten by the phone normalizer.
    #[serde(default = "default_phone_country_prefix")]
    pub phone_country_prefix: String,

    /// National trunk prefix substituted by the phone normalizer.
    #[serde(default = "default_phone_trunk_prefix")]
    pub phone_trunk_prefix: String,
}

impl Default for CoalescerSettings {
    fn default() -> Self {
        Self {
            window_duration_secs: default_window_duration_secs(),
            window_policy: default_window_policy(),
            admission_cache_capacity: default_admission_cache_capacity(),
            key_normalization: default_key_normalization(),
            phone_country_prefix: default_phone_country_prefix(),
            phone_trunk_prefix: default_phone_trunk_prefix(),
        }
    }
}

/// Longest accepted window, one day.
pub const MAX_WINDOW_DURATION_SECS: u64 = 86_400;

fn default_window_duration_secs() -> u64 {
    60
}

fn default_window_policy() -> String {
    "tumbling".to_string()
}

fn default_admission_cache_capacity() -> usize {
    DEFAULT_ADMISSION_CAPACITY
}

fn default_key_normalization() -> String {
    "phone".to_string()
}

fn default_phone_country_prefix() -> String {
    DEFAULT_COUNTRY_PREFIX.to_string()
}

fn default_phone_trunk_prefix() -> String {
    DEFAULT_TRUNK_PREFIX.to_string()
}

impl CoalescerSettings {
    /// Builds the domain configuration from these settings.
    pub fn to_coalescer_config(&self) -> Result<CoalescerConfig, ConfigLoadError> {
        let window_policy: WindowPolicy = self
            .window_policy
            .parse()
            .map_err(|message| ConfigLoadError::Invalid { message })?;

        let config = CoalescerConfig::default()
            .with_window_duration(Duration::from_secs(self.window_duration_secs))
            .with_window_policy(window_policy)
            .with_admission_cache_capacity(self.admission_cache_capacity);

        match self.key_normalization.to_lowercase().as_str() {
            "identity" => Ok(config.with_key_normalizer(IdentityNormalizer)),
            "phone" => Ok(config.with_key_normalizer(PhoneNumberNormalizer::new(
                self.phone_country_prefix.clone(),
                self.phone_trunk_prefix.clone(),
            ))),
            other => Err(ConfigLoadError::Invalid {
                message: format!(
                    "coalescer.key_normalization must be one of: [\"identity\", \"phone\"], got: {other}"
                ),
            }),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Serve metrics over HTTP
    #[serde(default)]
    pub enabled: bool,

    /// Address of the Prometheus scrape endpoint
    #[serde(default = "default_metrics_listen_address")]
    pub listen_address: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_listen_address(),
        }
    }
}

fn default_metrics_listen_address() -> String {
    "0.0.0.0:9000".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `SMSBURST_` and use `__` as
    /// separator, e.g. `SMSBURST_COALESCER__WINDOW_DURATION_SECS=30`
    /// overrides `coalescer.window_duration_secs`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.coalescer.window_duration_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "coalescer.window_duration_secs must be greater than 0".to_string(),
            });
        }

        if self.coalescer.window_duration_secs > MAX_WINDOW_DURATION_SECS {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "coalescer.window_duration_secs must be at most {MAX_WINDOW_DURATION_SECS}, got: {}",
                    self.coalescer.window_duration_secs
                ),
            });
        }

        if self.coalescer.admission_cache_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "coalescer.admission_cache_capacity must be greater than 0".to_string(),
            });
        }

        if let Err(message) = self.coalescer.window_policy.parse::<WindowPolicy>() {
            return Err(ConfigLoadError::Invalid {
                message: format!("coalescer.window_policy: {message}"),
            });
        }

        let valid_normalizations = ["identity", "phone"];
        if !valid_normalizations.contains(&self.coalescer.key_normalization.to_lowercase().as_str())
        {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "coalescer.key_normalization must be one of: {:?}, got: {}",
                    valid_normalizations, self.coalescer.key_normalization
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        if self.metrics.enabled && self.metrics.listen_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "metrics.listen_address is not a valid socket address: {}",
                    self.metrics.listen_address
                ),
            });
        }

        Ok(())
    }
}

fn environment() -> Environment {
    // SMSBURST_COALESCER__WINDOW_POLICY -> coalescer.window_policy
    Environment::with_prefix("SMSBURST")
        .prefix_separator("_")
        .separator("__")
}

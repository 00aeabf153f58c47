//! Configuration management for the collator.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI and environment overrides (applied by the `cli` module)
//! - Validation and defaults

use crate::core::{CollatorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest number of measurements the metrics endpoint accepts per request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 300;

/// Minimum buffer size of each per-source channel.
pub const DEFAULT_SOURCE_BUFFER: usize = 2 << 9;

/// Minimum buffer size of the two shared collation channels.
pub const DEFAULT_COLLATE_BUFFER: usize = 2 << 10;

const DEFAULT_METRICS_URL: &str = "https://metrics-api.librato.com/v1/metrics";
const DEFAULT_ANNOTATIONS_URL: &str = "https://metrics-api.librato.com/v1/annotations";

/// Complete configuration for the collator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batching and buffering behaviour
    pub collation: CollationConfig,
    /// Remote endpoint and credentials
    pub endpoint: EndpointConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Collation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollationConfig {
    /// Period of the flush timer
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Combined gauge and counter count that forces an early flush
    pub max_batch_size: usize,
    /// Source label attached to every observation
    pub source: Option<String>,
    /// Minimum buffer size of each per-source channel (power of two)
    pub source_buffer: usize,
    /// Minimum buffer size of the shared collation channels (power of two)
    pub collate_buffer: usize,
}

/// Endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL batches are posted to
    pub metrics_url: String,
    /// Base URL annotations are posted under
    pub annotations_url: String,
    /// Basic auth user
    pub user: String,
    /// Basic auth token
    pub token: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include target, thread ids and line numbers in log lines
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for CollationConfig {
    fn default() -> Self {
        CollationConfig {
            flush_interval: Duration::from_secs(5),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            source: None,
            source_buffer: DEFAULT_SOURCE_BUFFER,
            collate_buffer: DEFAULT_COLLATE_BUFFER,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            metrics_url: DEFAULT_METRICS_URL.to_string(),
            annotations_url: DEFAULT_ANNOTATIONS_URL.to_string(),
            user: String::new(),
            token: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl CollationConfig {
    /// Validate the collation settings
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(CollatorError::config("flush_interval must be greater than 0"));
        }

        if self.max_batch_size == 0 {
            return Err(CollatorError::config("max_batch_size must be greater than 0"));
        }

        for (field, size) in [
            ("source_buffer", self.source_buffer),
            ("collate_buffer", self.collate_buffer),
        ] {
            if !size.is_power_of_two() {
                return Err(CollatorError::config(format!(
                    "{} must be a non-zero power of two, got {}",
                    field, size
                )));
            }
        }

        Ok(())
    }

    /// Source label to attach, treating an empty string as unset
    pub fn source_label(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.is_empty())
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.collation.validate()?;

        if self.endpoint.metrics_url.is_empty() {
            return Err(CollatorError::config("metrics_url must not be empty"));
        }

        if self.endpoint.annotations_url.is_empty() {
            return Err(CollatorError::config("annotations_url must not be empty"));
        }

        if self.endpoint.timeout.is_zero() {
            return Err(CollatorError::config("endpoint timeout must be greater than 0"));
        }

        Ok(())
    }

    /// True when both credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.endpoint.user.is_empty() && !self.endpoint.token.is_empty()
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| CollatorError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.collation.flush_interval = interval;
        self
    }

    /// Set the early-flush threshold
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.collation.max_batch_size = size;
        self
    }

    /// Set the source label
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.collation.source = Some(source.into());
        self
    }

    /// Set the per-source channel buffer
    pub fn source_buffer(mut self, size: usize) -> Self {
        self.config.collation.source_buffer = size;
        self
    }

    /// Set the shared collation channel buffer
    pub fn collate_buffer(mut self, size: usize) -> Self {
        self.config.collation.collate_buffer = size;
        self
    }

    /// Set metrics URL
    pub fn metrics_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.metrics_url = url.into();
        self
    }

    /// Set annotations URL
    pub fn annotations_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.annotations_url = url.into();
        self
    }

    /// Set credentials
    pub fn credentials(mut self, user: impl Into<String>, token: impl Into<String>) -> Self {
        self.config.endpoint.user = user.into();
        self.config.endpoint.token = token.into();
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Configuration and error types shared by every collator component.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{CollationConfig, Config, ConfigBuilder, EndpointConfig, LogLevel, LoggingConfig};
pub use error::{CollatorError, Result};

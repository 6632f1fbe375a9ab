//! TSP Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use tsp_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[publisher]\nport = 7175").unwrap();
//! assert_eq!(config.publisher.port, 7175);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [publisher]
//! port = 7165
//! ipv6 = false
//! metadata_refresh_allowed = true
//! nan_value_filter_allowed = true
//! nan_value_filter_forced = false
//! cipher_key_rotation_period = "60s"
//!
//! [log]
//! level = "info"
//! format = "console"
//! ```

mod error;
mod logging;
mod publisher;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use publisher::PublisherConfig;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Publisher settings (listener, filtering, cipher rotation, limits)
    pub publisher: PublisherConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

//! Configuration management for MediaBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MEDIABOX__<section>__<key>`
//!
//! Examples:
//! - `MEDIABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MEDIABOX__RETENTION__JOB_TTL=2h`
//! - `MEDIABOX__RUNNER__MAX_ATTEMPTS=3`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mediabox.toml`.
//! This can be overridden using the `MEDIABOX_CONFIG` environment variable
//! or the `--config` CLI flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, EngineConfig, RetentionConfig, RunnerConfig, ServerConfig, StorageConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MEDIABOX__*`)
    /// 2. TOML file (default: `config/mediabox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] but with an explicit TOML path taking precedence
    /// over `MEDIABOX_CONFIG`
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check an already-built configuration (tests build `Config` directly)
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

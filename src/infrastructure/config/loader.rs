use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_walk_depth: {0}. Must be at least 1")]
    InvalidWalkDepth(u32),

    #[error(
        "Invalid copy-task retry: retry_initial_ms ({0}) must be less than retry_max_elapsed_ms ({1})"
    )]
    InvalidCopyRetry(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .procflow/config.yaml (project config, created by init)
    /// 3. .procflow/local.yaml (project local overrides, optional)
    /// 4. Environment variables (PROCFLOW_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new(".procflow"))
    }

    /// Same merge as [`Self::load`], reading the YAML layers from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Config> {
        let config: Config = Self::figment()
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("PROCFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::figment()
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.engine.max_walk_depth == 0 {
            return Err(ConfigError::InvalidWalkDepth(config.engine.max_walk_depth));
        }

        let retry = &config.copy_tasks;
        if retry.retry_initial_ms >= retry.retry_max_elapsed_ms {
            return Err(ConfigError::InvalidCopyRetry(
                retry.retry_initial_ms,
                retry.retry_max_elapsed_ms,
            ));
        }
        if retry.read_names_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "copy_tasks.read_names_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{Config, StorageBackend};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database URL cannot be empty when the sqlite backend is selected")]
    EmptyDatabaseUrl,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Event log capacity cannot be 0")]
    ZeroEventCapacity,

    #[error(
        "Invalid sync backoff: initial_backoff_ms ({0}) must be less than max_elapsed_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid metrics thresholds: warning ({0}) must not exceed critical ({1})")]
    InvalidHealthThresholds(usize, usize),

    #[error("Webhook endpoint path {0:?} must start with '/'")]
    InvalidWebhookPath(String),

    #[error("Unknown webhook provider: {0}. Must be one of: agent, board, pulls, generic")]
    UnknownWebhookProvider(String),

    #[error("Duplicate webhook endpoint path: {0}")]
    DuplicateWebhookPath(String),

    #[error("External binding name cannot be empty")]
    EmptyBindingName,

    #[error("Duplicate external binding name: {0}")]
    DuplicateBindingName(String),
}

/// Loads [`Config`] by merging defaults, project yaml files, and
/// environment variables.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.conveyor/config.yaml` (project config)
    /// 3. `.conveyor/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`CONVEYOR_*`, `__` as section separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".conveyor/config.yaml"))
            .merge(Yaml::file(".conveyor/local.yaml"))
            .merge(Env::prefixed("CONVEYOR_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still layered over the
    /// defaults and under the environment.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CONVEYOR_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a loaded configuration.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.database.backend == StorageBackend::Sqlite && config.database.url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        if config.event_log.capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }

        if config.sync.initial_backoff_ms >= config.sync.max_elapsed_ms {
            return Err(ConfigError::InvalidBackoff(
                config.sync.initial_backoff_ms,
                config.sync.max_elapsed_ms,
            ));
        }

        if config.metrics.failure_warning_threshold > config.metrics.failure_critical_threshold {
            return Err(ConfigError::InvalidHealthThresholds(
                config.metrics.failure_warning_threshold,
                config.metrics.failure_critical_threshold,
            ));
        }
        if config.metrics.bottleneck_warning_threshold
            > config.metrics.bottleneck_critical_threshold
        {
            return Err(ConfigError::InvalidHealthThresholds(
                config.metrics.bottleneck_warning_threshold,
                config.metrics.bottleneck_critical_threshold,
            ));
        }

        let known_providers = ["agent", "board", "pulls", "generic"];
        let mut seen_paths = std::collections::HashSet::new();
        for endpoint in &config.webhooks {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::InvalidWebhookPath(endpoint.path.clone()));
            }
            if !known_providers.contains(&endpoint.provider.as_str()) {
                return Err(ConfigError::UnknownWebhookProvider(
                    endpoint.provider.clone(),
                ));
            }
            if !seen_paths.insert(endpoint.path.clone()) {
                return Err(ConfigError::DuplicateWebhookPath(endpoint.path.clone()));
            }
        }

        let mut seen_bindings = std::collections::HashSet::new();
        for binding in &config.bindings {
            if binding.name.is_empty() {
                return Err(ConfigError::EmptyBindingName);
            }
            if !seen_bindings.insert(binding.name.clone()) {
                return Err(ConfigError::DuplicateBindingName(binding.name.clone()));
            }
        }

        Ok(())
    }
}

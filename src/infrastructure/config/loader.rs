use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::settings::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("region cannot be empty")]
    EmptyRegion,

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("detect.cache_dir cannot be empty")]
    EmptyCacheDir,

    #[error("collection.hard_timeout_ms ({0}) must exceed every per-source soft timeout")]
    HardTimeoutTooShort(u64),

    #[error("safety.circuit_breaker.failure_threshold must be at least 1")]
    InvalidFailureThreshold,

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `.incident-pipeline/incident.yaml` (project config)
    /// 3. `.incident-pipeline/incident.local.yaml` (local overrides, optional)
    /// 4. Environment variables (`INCIDENT_*` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".incident-pipeline/incident.yaml"))
            .merge(Yaml::file(".incident-pipeline/incident.local.yaml"))
            .merge(Env::prefixed("INCIDENT_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project/local
    /// layers — used by tests and by callers that manage their own config
    /// path.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.region.is_empty() {
            return Err(ConfigError::EmptyRegion);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.detect.cache_dir.is_empty() {
            return Err(ConfigError::EmptyCacheDir);
        }

        let max_soft_timeout = [
            config.collection.soft_timeouts.metrics_ms,
            config.collection.soft_timeouts.alarms_ms,
            config.collection.soft_timeouts.trail_ms,
            config.collection.soft_timeouts.anomaly_ms,
            config.collection.soft_timeouts.health_ms,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        if config.collection.hard_timeout_ms <= max_soft_timeout {
            return Err(ConfigError::HardTimeoutTooShort(config.collection.hard_timeout_ms));
        }

        if config.safety.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }

        Ok(())
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::MAX_BATCH_SIZE;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid batch_size: {0}. Must be between 1 and 100")]
    InvalidBatchSize(usize),

    #[error("Invalid max_concurrent: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrent(usize),

    #[error("Invalid timeout_secs: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Invalid cost_limit: {0}. Must be positive")]
    InvalidCostLimit(f64),

    #[error("Invalid complexity threshold: {0}. Must be between 0 and 10")]
    InvalidComplexityThreshold(f64),

    #[error("Invalid benefit_ratio: {0}. Must be at least 1.0")]
    InvalidBenefitRatio(f64),

    #[error("Invalid max_change_ratio: {0}. Must be within (0, 1]")]
    InvalidChangeRatio(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Model name cannot be empty")]
    EmptyModel,

    #[error("Engine command cannot be empty")]
    EmptyEngineCommand,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `<project>/.testweaver/config.yaml`
    /// 3. `<project>/.testweaver/local.yaml` (optional overrides)
    /// 4. Environment variables (`TESTWEAVER_*` prefix, `__` for nesting)
    pub fn load(project: &Path) -> Result<Config> {
        let config_dir = project.join(".testweaver");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_dir.join("config.yaml")))
            .merge(Yaml::file(config_dir.join("local.yaml")))
            .merge(Env::prefixed("TESTWEAVER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("TESTWEAVER_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let batch_size = config.batching.batch_size;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }

        if config.batching.benefit_ratio.is_nan() || config.batching.benefit_ratio < 1.0 {
            return Err(ConfigError::InvalidBenefitRatio(config.batching.benefit_ratio));
        }

        let ai = &config.ai;
        if ai.max_concurrent == 0 || ai.max_concurrent > 64 {
            return Err(ConfigError::InvalidMaxConcurrent(ai.max_concurrent));
        }

        if ai.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(ai.timeout_secs));
        }

        if let Some(limit) = ai.cost_limit {
            if limit.is_nan() || limit <= 0.0 {
                return Err(ConfigError::InvalidCostLimit(limit));
            }
        }

        if ai.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        if ai.engine_command.trim().is_empty() {
            return Err(ConfigError::EmptyEngineCommand);
        }

        for threshold in [
            config.analysis.complexity_threshold,
            config.analysis.min_complexity_for_ai,
        ] {
            if !(0.0..=10.0).contains(&threshold) {
                return Err(ConfigError::InvalidComplexityThreshold(threshold));
            }
        }

        let ratio = config.incremental.max_change_ratio;
        if ratio.is_nan() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::InvalidChangeRatio(ratio));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        for rate in &config.pricing {
            if rate.model.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "pricing entry model cannot be empty".to_string(),
                ));
            }
            if rate.input_per_million < 0.0 || rate.output_per_million < 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "pricing for '{}' cannot be negative",
                    rate.model
                )));
            }
        }

        Ok(())
    }
}

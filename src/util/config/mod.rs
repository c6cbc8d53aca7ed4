//! chanlab configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (CHANLAB_*)
//! 3. Config file (--config FILE, or ./chanlab.toml)
//! 4. Default values
//! ```
//!
//! # File format
//!
//! ```toml
//! [scheduler]
//! exit_policy = "main-exit"
//! start_jitter_ms = 5
//!
//! [log]
//! level = "debug"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::{ExitPolicy, SchedulerConfig};
use crate::util::logger::LogLevel;

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "chanlab.toml";

/// Overrides `scheduler.exit_policy`.
pub const ENV_EXIT_POLICY: &str = "CHANLAB_EXIT_POLICY";
/// Overrides `scheduler.start_jitter_ms`.
pub const ENV_JITTER_MS: &str = "CHANLAB_JITTER_MS";
/// Overrides `log.level`.
pub const ENV_LOG: &str = "CHANLAB_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level written to stderr
    #[serde(default)]
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value `{value}` for {key}: {message}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        message: String,
    },
}

/// Parse a config file's contents.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Render a config as TOML.
pub fn to_toml_string(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Load the config file layer.
///
/// An explicit `path` must exist. Without one, `./chanlab.toml` is used if
/// present, otherwise the defaults.
pub fn load_file(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(CONFIG_FILE_NAME);
            if !default.exists() {
                return Ok(Config::default());
            }
            default
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    parse_config(&content)
}

/// Apply `CHANLAB_*` overrides read through `lookup`.
pub fn apply_env_with<F>(
    config: &mut Config,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_EXIT_POLICY) {
        config.scheduler.exit_policy =
            value
                .parse::<ExitPolicy>()
                .map_err(|message| ConfigError::InvalidEnv {
                    key: ENV_EXIT_POLICY,
                    value: value.clone(),
                    message,
                })?;
    }

    if let Some(value) = lookup(ENV_JITTER_MS) {
        config.scheduler.start_jitter_ms =
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnv {
                    key: ENV_JITTER_MS,
                    value: value.clone(),
                    message: e.to_string(),
                })?;
    }

    if let Some(value) = lookup(ENV_LOG) {
        config.log.level = value
            .parse::<LogLevel>()
            .map_err(|message| ConfigError::InvalidEnv {
                key: ENV_LOG,
                value: value.clone(),
                message,
            })?;
    }

    Ok(())
}

/// Apply overrides from the process environment.
pub fn apply_env(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_with(config, |key| std::env::var(key).ok())
}

/// File layer followed by the environment layer.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = load_file(path)?;
    apply_env(&mut config)?;
    Ok(config)
}

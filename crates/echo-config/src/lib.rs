//! Configuration management for Echo
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (ECHO_* prefix, highest precedence)
//! 2. echo.local.toml (gitignored, local overrides)
//! 3. echo.toml (git-tracked, project config)
//! 4. ~/.config/echo/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main Echo configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub engine: EngineConfig,
    pub authoring: AuthoringConfig,
    pub logging: LoggingConfig,
}

/// Decision engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for resolving all dynamic attributes of one request.
    pub attribute_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribute_timeout_ms: 250,
        }
    }
}

impl EngineConfig {
    pub fn attribute_timeout(&self) -> Duration {
        Duration::from_millis(self.attribute_timeout_ms)
    }
}

/// Policy write-path settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoringConfig {
    pub conflict_mode: ConflictMode,
    /// Worker threads used by bulk create/update.
    pub bulk_concurrency: usize,
}

impl Default for AuthoringConfig {
    fn default() -> Self {
        Self {
            conflict_mode: ConflictMode::Reject,
            bulk_concurrency: 10,
        }
    }
}

/// What a write does when the candidate conflicts with existing policies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// Refuse the write.
    #[default]
    Reject,
    /// Persist anyway and report the conflicts.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EchoConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Load a single TOML file on top of the built-in defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.attribute_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine.attribute_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.authoring.bulk_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "authoring.bulk_concurrency must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }
        Ok(())
    }
}

//! Layered configuration loading.
//!
//! Precedence, lowest first: built-in defaults, `~/.config/echo/config.toml`,
//! `echo.toml`, `echo.local.toml`, `ECHO_*` environment variables.

use crate::{ConfigError, EchoConfig, Paths};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_source: Option<HashMap<String, String>>,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ECHO".to_string(),
            env_source: None,
            include_user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read environment overrides from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Skip ~/.config/echo/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Files consulted, lowest precedence first. Missing files are skipped.
    fn file_sources(&self) -> Vec<PathBuf> {
        let mut files = Vec::with_capacity(3);
        if self.include_user_config
            && let Ok(user_file) = Paths::new().user_config_file()
        {
            files.push(user_file);
        }
        files.push(Paths::project_config_file(&self.project_dir));
        files.push(Paths::local_config_file(&self.project_dir));
        files.retain(|path| path.exists());
        files
    }

    /// Merges defaults, config files, and environment overrides, then
    /// validates the result.
    ///
    /// Environment keys use `_` after the prefix and `__` between section
    /// and field, e.g. `ECHO_AUTHORING__CONFLICT_MODE=warn`.
    pub fn load(self) -> Result<EchoConfig, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&EchoConfig::default())?);

        for file in self.file_sources() {
            builder = builder.add_source(config::File::from(file).format(config::FileFormat::Toml));
        }

        let environment = config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env_source);

        let loaded: EchoConfig = builder.add_source(environment).build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Falls back to defaults when any source is unreadable or invalid.
    pub fn load_or_default(self) -> EchoConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConflictMode;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .without_user_config()
            .with_env_source(HashMap::new())
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, EchoConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[engine]
attribute_timeout_ms = 500

[authoring]
conflict_mode = "warn"
bulk_concurrency = 4
"#;
        fs::write(project_dir.join("echo.toml"), config_content).expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.engine.attribute_timeout_ms, 500);
        assert_eq!(config.authoring.conflict_mode, ConflictMode::Warn);
        assert_eq!(config.authoring.bulk_concurrency, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("echo.toml"),
            r#"
[logging]
level = "warn"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("echo.local.toml"),
            r#"
[logging]
level = "debug"
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_environment_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("echo.local.toml"),
            "[authoring]\nconflict_mode = \"reject\"\n",
        )
        .expect("Failed to write local config");

        let vars = HashMap::from([
            ("ECHO_AUTHORING__CONFLICT_MODE".to_string(), "warn".to_string()),
            ("ECHO_ENGINE__ATTRIBUTE_TIMEOUT_MS".to_string(), "75".to_string()),
        ]);
        let config = loader(project_dir)
            .with_env_source(vars)
            .load()
            .expect("Failed to load config");

        assert_eq!(config.authoring.conflict_mode, ConflictMode::Warn);
        assert_eq!(config.engine.attribute_timeout_ms, 75);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("echo.toml"),
            "[authoring]\nbulk_concurrency = 0\n",
        )
        .expect("Failed to write config");

        assert!(matches!(
            loader(project_dir).load(),
            Err(ConfigError::ValidationError(_))
        ));
        assert_eq!(loader(project_dir).load_or_default(), EchoConfig::default());
    }
}

//! Configuration commands.

use std::path::Path;

use anyhow::{Context, Result};
use echo_config::{ConfigLoader, EchoConfig, Paths};

use crate::style::{info_table, print_labeled};

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Text,
    Json,
    Toml,
}

/// Show the effective configuration for `project`.
pub fn show(project: &Path, format: ConfigFormat) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")?;

    match format {
        ConfigFormat::Json => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigFormat::Toml => {
            print!("{}", config.to_toml()?);
        }
        ConfigFormat::Text => print_text(project, &config),
    }

    Ok(())
}

fn print_text(project: &Path, config: &EchoConfig) {
    let sources = if Paths::has_project_config(project) {
        Paths::project_config_file(project).display().to_string()
    } else {
        "defaults".to_string()
    };
    print_labeled("Project config", &sources);
    println!();

    let entries = [
        (
            "engine.attribute_timeout_ms",
            config.engine.attribute_timeout_ms.to_string(),
        ),
        (
            "authoring.conflict_mode",
            format!("{:?}", config.authoring.conflict_mode).to_lowercase(),
        ),
        (
            "authoring.bulk_concurrency",
            config.authoring.bulk_concurrency.to_string(),
        ),
        ("logging.level", config.logging.level.clone()),
    ];
    println!("{}", info_table(&entries));
}

//! `echo-pdp`: command-line front end for the Echo policy decision point.
//!
//! # Quick Start
//!
//! ```bash
//! # Check a policy file
//! echo-pdp validate policies.json
//!
//! # Decide a request, supplying dynamic attributes
//! echo-pdp decide --policies policies.json --request request.json --attributes risk.json
//!
//! # Find opposing policies that would tie
//! echo-pdp conflicts policies.json
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use echo_config::{ConfigLoader, EchoConfig};
use tracing_subscriber::EnvFilter;

use commands::Format;
use commands::config::ConfigFormat;

/// Echo - attribute-based policy decisions.
#[derive(Parser)]
#[command(name = "echo-pdp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Check every policy in a JSON file for structural validity.
    Validate {
        /// JSON array of policies.
        policies: PathBuf,
    },

    /// Decide an access request against a policy file.
    Decide {
        /// JSON array of policies.
        #[arg(short, long)]
        policies: PathBuf,

        /// JSON access request.
        #[arg(short, long)]
        request: PathBuf,

        /// JSON object of values for dynamic attributes.
        #[arg(short, long)]
        attributes: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List pairs of policies that conflict.
    Conflicts {
        /// JSON array of policies.
        policies: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Project directory holding echo.toml.
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: ConfigFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    let config = ConfigLoader::new().load_or_default();
    init_logging(&config);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Validate { policies } => commands::validate::run(&policies),
        Commands::Decide {
            policies,
            request,
            attributes,
            format,
        } => commands::decide::run(&policies, &request, attributes.as_deref(), format, &config),
        Commands::Conflicts { policies, format } => commands::conflicts::run(&policies, format),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { project, format } => commands::config::show(&project, format),
        },
    }
}

/// Logs go to stderr so JSON output stays machine readable. `RUST_LOG`
/// overrides the configured level.
fn init_logging(config: &EchoConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

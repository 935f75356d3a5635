//! CLI command implementations.

pub mod config;
pub mod conflicts;
pub mod decide;
pub mod input;
pub mod validate;
pub mod version;

/// Output format for commands that print structured results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
}

//! One-line status messages.
//!
//! Results go to stdout; failures go to stderr so a failing `validate` can be
//! piped without mixing the two.

use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {msg}", "✓".success());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {msg}", "✗".error());
}

pub fn print_warn(msg: &str) {
    println!("{} {msg}", "⚠".warning());
}

/// `  key: value`, with the key dimmed.
pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {value}", key.muted());
}

/// Blank line, then a bold heading.
pub fn print_section(title: &str) {
    println!("\n{}", title.header());
}

//! Version banner.

use super::colors::SemanticStyle;

pub fn print_version_banner(name: &str, version: &str) {
    println!();
    println!("  {} {}", name.header(), format!("v{version}").muted());
    println!("  {}", "Attribute-based policy decision point".muted());
    println!();
}

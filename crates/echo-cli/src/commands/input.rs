//! Reading policy, request, and attribute files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use echo_abac::attributes::AccessRequest;
use echo_abac::policy::Policy;
use echo_abac::providers::StaticAttributeProvider;
use serde::de::DeserializeOwned;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {what} file {}", path.display()))
}

/// Reads a JSON array of policies.
pub fn load_policies(path: &Path) -> Result<Vec<Policy>> {
    let policies: Vec<Policy> = read_json(path, "policies")?;
    tracing::debug!(path = %path.display(), count = policies.len(), "policies loaded");
    Ok(policies)
}

pub fn load_request(path: &Path) -> Result<AccessRequest> {
    read_json(path, "request")
}

/// Reads a JSON object of dynamic attribute values.
pub fn load_attributes(path: &Path) -> Result<StaticAttributeProvider> {
    read_json(path, "attributes")
}

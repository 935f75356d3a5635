//! Validate command: structural checks on a policy file.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Result, bail};

use super::input;
use crate::style::{print_error, print_success};

pub fn run(path: &Path) -> Result<()> {
    let policies = input::load_policies(path)?;

    let mut seen = HashSet::new();
    let mut invalid = 0usize;
    for policy in &policies {
        let outcome = if seen.insert(policy.id) {
            policy.validate().map_err(|e| e.to_string())
        } else {
            Err(format!("duplicate policy id {}", policy.id))
        };

        match outcome {
            Ok(()) => print_success(&format!("{} ({})", policy.name, policy.id)),
            Err(reason) => {
                invalid += 1;
                print_error(&format!("{} ({}): {reason}", policy.name, policy.id));
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} of {} policies are invalid", policies.len());
    }
    println!();
    print_success(&format!("{} policies valid", policies.len()));
    Ok(())
}

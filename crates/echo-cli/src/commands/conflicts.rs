//! Conflicts command: report opposing policies with overlapping scope.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use echo_abac::conflict::{Conflict, detect_conflicts};
use echo_abac::policy::Policy;

use super::{Format, input};
use crate::style::{print_success, print_warn, styled_table};

#[derive(Debug)]
struct ConflictPair<'a> {
    policy: &'a Policy,
    conflict: Conflict,
}

pub fn run(path: &Path, format: Format) -> Result<()> {
    let policies = input::load_policies(path)?;
    let now = Utc::now();

    // Each unordered pair once: conflicts are symmetric.
    let pairs: Vec<ConflictPair<'_>> = policies
        .iter()
        .enumerate()
        .flat_map(|(index, policy)| {
            detect_conflicts(policy, &policies[index + 1..], now)
                .into_iter()
                .map(move |conflict| ConflictPair { policy, conflict })
        })
        .collect();

    match format {
        Format::Json => {
            let rows: Vec<serde_json::Value> = pairs
                .iter()
                .map(|pair| {
                    serde_json::json!({
                        "policy_id": pair.policy.id,
                        "policy_name": pair.policy.name,
                        "conflicts_with": pair.conflict,
                    })
                })
                .collect();
            let json = serde_json::to_string_pretty(&rows).context("Failed to render conflicts")?;
            println!("{json}");
        }
        Format::Text if pairs.is_empty() => {
            print_success(&format!("No conflicts among {} policies", policies.len()));
        }
        Format::Text => {
            let rows: Vec<Vec<String>> = pairs
                .iter()
                .map(|pair| {
                    vec![
                        format!("{} ({})", pair.policy.name, pair.policy.effect),
                        format!("{} ({})", pair.conflict.name, pair.conflict.effect),
                        pair.conflict.priority.to_string(),
                        pair.conflict
                            .shared_actions
                            .iter()
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                    ]
                })
                .collect();
            println!(
                "{}",
                styled_table(&["Policy", "Conflicts with", "Priority", "Actions"], &rows)
            );
            print_warn(&format!("{} conflicting pair(s)", pairs.len()));
        }
    }
    Ok(())
}

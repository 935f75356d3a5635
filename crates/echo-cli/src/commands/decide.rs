//! Decide command: resolve one access request against a policy file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use echo_abac::evaluator::{ConditionStatus, ConditionTrace};
use echo_abac::providers::{AttributeProvider, ClockAttributeProvider, ProviderChain};
use echo_abac::resolver::{Decision, DecisionResolver, TraceEntry, TraceStage};
use echo_config::EchoConfig;

use super::{Format, input};
use crate::style::colors::{SemanticStyle, outcome_label};
use crate::style::{print_labeled, print_section, styled_table};

pub fn run(
    policies: &Path,
    request: &Path,
    attributes: Option<&Path>,
    format: Format,
    config: &EchoConfig,
) -> Result<()> {
    let policies = input::load_policies(policies)?;
    let request = input::load_request(request)?;

    // Supplied values win; clock-derived attributes fill in the rest.
    let mut chain = ProviderChain::new();
    if let Some(path) = attributes {
        chain = chain.with(input::load_attributes(path)?);
    }
    let provider: Arc<dyn AttributeProvider> = Arc::new(chain.with(ClockAttributeProvider));

    let resolver = DecisionResolver::new()
        .with_provider(provider)
        .with_timeout(config.engine.attribute_timeout());
    let decision = resolver.resolve(&request, &policies);

    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&decision).context("Failed to render decision")?;
            println!("{json}");
        }
        Format::Text => print_decision(&decision),
    }
    Ok(())
}

fn print_decision(decision: &Decision) {
    println!("{}", outcome_label(decision.outcome));
    print_labeled("Reason", &decision.reason);
    if let Some(id) = decision.matched_policy_id {
        print_labeled("Policy", &id.to_string());
    }

    if !decision.obligations.is_empty() {
        print_section("Obligations");
        for obligation in &decision.obligations {
            println!("  {} {}: {}", "-".muted(), obligation.kind, obligation.action);
        }
    }

    if !decision.advice.is_empty() {
        print_section("Advice");
        for (key, value) in &decision.advice {
            print_labeled(key, value);
        }
    }

    if decision.trace.is_empty() {
        return;
    }
    print_section("Trace");
    let rows: Vec<Vec<String>> = decision.trace.iter().map(trace_row).collect();
    println!(
        "{}",
        styled_table(&["Policy", "Effect", "Match", "Conditions", "Stage"], &rows)
    );
}

fn trace_row(entry: &TraceEntry) -> Vec<String> {
    let conditions = match entry.condition_result {
        None => "-".to_string(),
        Some(result) => {
            let failures: Vec<String> = entry.conditions.iter().filter_map(condition_failure).collect();
            if failures.is_empty() {
                result.to_string()
            } else {
                format!("{result} ({})", failures.join("; "))
            }
        }
    };
    let stage = match entry.stage {
        TraceStage::NotApplicable => "not applicable",
        TraceStage::ConditionsNotSatisfied => "conditions not satisfied",
        TraceStage::Overridden => "overridden",
        TraceStage::Decisive => "decisive",
    };

    vec![
        entry.policy_name.clone(),
        entry.effect.to_string(),
        entry.applicability.to_string(),
        conditions,
        stage.to_string(),
    ]
}

/// Describes a leaf that failed or errored; passing and skipped nodes are omitted.
fn condition_failure(trace: &ConditionTrace) -> Option<String> {
    match &trace.status {
        ConditionStatus::Failed if !trace.attribute.is_empty() => {
            Some(format!("{} {} failed", trace.attribute, trace.operator))
        }
        ConditionStatus::Error { error } => Some(error.to_string()),
        _ => None,
    }
}

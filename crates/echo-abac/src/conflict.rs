//! Write-time conflict detection.
//!
//! Two policies conflict when some request could be matched by both, their
//! effects are opposite, and their priorities are equal: the decision for
//! that request would then hinge on tie-breaking rather than on intent.
//! Conflicts are reported to the author, never auto-resolved, and this
//! module is never consulted on the decision path.
//!
//! The relation is symmetric and irreflexive (a policy never conflicts with
//! another revision of itself).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use echo_types::PolicyId;
use serde::{Deserialize, Serialize};

use crate::policy::{Effect, Policy};

/// An existing policy that conflicts with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub policy_id: PolicyId,
    pub name: String,
    pub priority: i64,
    pub effect: Effect,
    /// Actions declared by both policies.
    pub shared_actions: BTreeSet<String>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actions: Vec<&str> = self.shared_actions.iter().map(String::as_str).collect();
        write!(
            f,
            "{} ({}, {} at priority {}) on [{}]",
            self.name,
            self.policy_id,
            self.effect,
            self.priority,
            actions.join(", ")
        )
    }
}

/// Ids of the policies in `existing` that conflict with `candidate` now.
pub fn find_conflicts(candidate: &Policy, existing: &[Policy]) -> Vec<PolicyId> {
    detect_conflicts(candidate, existing, Utc::now())
        .into_iter()
        .map(|c| c.policy_id)
        .collect()
}

/// Detailed conflicts between `candidate` and `existing`, evaluated at `at`.
///
/// Results follow the order of `existing`.
pub fn detect_conflicts(candidate: &Policy, existing: &[Policy], at: DateTime<Utc>) -> Vec<Conflict> {
    let conflicts: Vec<Conflict> = existing
        .iter()
        .filter_map(|other| {
            let shared_actions = conflicting_actions(candidate, other, at)?;
            Some(Conflict {
                policy_id: other.id,
                name: other.name.clone(),
                priority: other.priority,
                effect: other.effect,
                shared_actions,
            })
        })
        .collect();

    if !conflicts.is_empty() {
        tracing::debug!(
            policy_id = %candidate.id,
            conflicts = conflicts.len(),
            "conflicting policies detected"
        );
    }
    conflicts
}

/// Whether `a` and `b` conflict at `at`.
pub fn conflicts_with(a: &Policy, b: &Policy, at: DateTime<Utc>) -> bool {
    conflicting_actions(a, b, at).is_some()
}

/// Shared actions when `a` and `b` conflict, `None` otherwise.
fn conflicting_actions(a: &Policy, b: &Policy, at: DateTime<Utc>) -> Option<BTreeSet<String>> {
    if a.id == b.id || a.effect == b.effect || a.priority != b.priority {
        return None;
    }
    if !participates(a, at) || !participates(b, at) || !windows_intersect(a, b) {
        return None;
    }

    let subjects_overlap = a
        .subjects
        .iter()
        .any(|x| b.subjects.iter().any(|y| x.overlaps(y)));
    let resources_overlap = a
        .resources
        .iter()
        .any(|x| b.resources.iter().any(|y| x.overlaps(y)));
    if !subjects_overlap || !resources_overlap {
        return None;
    }

    let shared: BTreeSet<String> = a.actions.intersection(&b.actions).cloned().collect();
    (!shared.is_empty()).then_some(shared)
}

/// Active and not already past its deactivation date.
fn participates(policy: &Policy, at: DateTime<Utc>) -> bool {
    policy.active && policy.deactivation_date.is_none_or(|until| at <= until)
}

fn windows_intersect(a: &Policy, b: &Policy) -> bool {
    let start = a.activation_date.max(b.activation_date);
    let end = match (a.deactivation_date, b.deactivation_date) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    };
    match (start, end) {
        (Some(start), Some(end)) => start <= end,
        _ => true,
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Versioning and change detection for policy updates.
//!
//! Every persisted update advances a policy's version by exactly one. An
//! update that changes no semantic field is a no-op: nothing is written, the
//! version stays put, and no event fires. Bookkeeping fields (`id`,
//! `version`, `created_at`, `updated_at`) never count as changes.

use chrono::{DateTime, Utc};

use crate::policy::Policy;

/// Result of diffing an incoming policy against the stored copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUpdate {
    /// The record to persist, or the unchanged stored record for a no-op.
    pub policy: Policy,
    pub should_persist: bool,
    /// Names of the semantic fields that differ, in declaration order.
    pub changed_fields: Vec<&'static str>,
}

/// Names of the semantic fields that differ between `existing` and `incoming`.
pub fn changed_fields(existing: &Policy, incoming: &Policy) -> Vec<&'static str> {
    let checks: [(&'static str, bool); 14] = [
        ("name", existing.name != incoming.name),
        ("description", existing.description != incoming.description),
        ("effect", existing.effect != incoming.effect),
        ("priority", existing.priority != incoming.priority),
        ("active", existing.active != incoming.active),
        ("subjects", existing.subjects != incoming.subjects),
        ("resources", existing.resources != incoming.resources),
        ("actions", existing.actions != incoming.actions),
        ("conditions", existing.conditions != incoming.conditions),
        ("activation_date", existing.activation_date != incoming.activation_date),
        ("deactivation_date", existing.deactivation_date != incoming.deactivation_date),
        ("obligations", existing.obligations != incoming.obligations),
        ("advice", existing.advice != incoming.advice),
        ("parent_policy_id", existing.parent_policy_id != incoming.parent_policy_id),
    ];

    checks
        .into_iter()
        .filter_map(|(field, differs)| differs.then_some(field))
        .collect()
}

/// Prepares `incoming` as the next revision of `existing`.
///
/// When nothing semantic changed, returns `existing` untouched with
/// `should_persist = false`. Otherwise returns `incoming` carrying the
/// identity and creation time of `existing`, the next version, and
/// `updated_at = now`.
pub fn prepare_update(existing: &Policy, incoming: &Policy, now: DateTime<Utc>) -> PreparedUpdate {
    let changed = changed_fields(existing, incoming);
    if changed.is_empty() {
        return PreparedUpdate {
            policy: existing.clone(),
            should_persist: false,
            changed_fields: changed,
        };
    }

    let mut policy = incoming.clone();
    policy.id = existing.id;
    policy.created_at = existing.created_at;
    policy.version = existing.version.next();
    policy.updated_at = now;

    PreparedUpdate {
        policy,
        should_persist: true,
        changed_fields: changed,
    }
}

// ============================================================================
// Tests
// ============================================================================

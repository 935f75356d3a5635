//! Policy applicability.
//!
//! Decides whether a policy's declarations cover a request, independent of
//! its conditions. A policy applies iff it is active, the request timestamp
//! lies inside its activation window, some subject matcher and some resource
//! matcher match, and the action is declared.

use serde::{Deserialize, Serialize};

use crate::attributes::AccessRequest;
use crate::policy::Policy;

/// Result of checking a policy against a request.
///
/// Every variant except `Applicable` names the first check that failed, in
/// the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    Applicable,
    /// `active` is false.
    Inactive,
    /// The request precedes `activation_date`.
    NotYetActive,
    /// The request follows `deactivation_date`.
    Expired,
    SubjectMismatch,
    ResourceMismatch,
    ActionMismatch,
}

impl Applicability {
    pub fn is_applicable(self) -> bool {
        self == Self::Applicable
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applicable => "applicable",
            Self::Inactive => "inactive",
            Self::NotYetActive => "not_yet_active",
            Self::Expired => "expired",
            Self::SubjectMismatch => "subject_mismatch",
            Self::ResourceMismatch => "resource_mismatch",
            Self::ActionMismatch => "action_mismatch",
        }
    }
}

impl std::fmt::Display for Applicability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks `policy` against `request` and names the first failing stage.
pub fn applicability(policy: &Policy, request: &AccessRequest) -> Applicability {
    if !policy.active {
        return Applicability::Inactive;
    }
    if policy
        .activation_date
        .is_some_and(|from| request.timestamp < from)
    {
        return Applicability::NotYetActive;
    }
    if policy
        .deactivation_date
        .is_some_and(|until| request.timestamp > until)
    {
        return Applicability::Expired;
    }
    if !policy.subjects.iter().any(|m| m.matches(&request.subject)) {
        return Applicability::SubjectMismatch;
    }
    if !policy.resources.iter().any(|m| m.matches(&request.resource)) {
        return Applicability::ResourceMismatch;
    }
    if !policy.actions.contains(&request.action) {
        return Applicability::ActionMismatch;
    }
    Applicability::Applicable
}

/// Whether `policy` applies to `request`.
pub fn matches(policy: &Policy, request: &AccessRequest) -> bool {
    applicability(policy, request).is_applicable()
}

// ============================================================================
// Tests
// ============================================================================

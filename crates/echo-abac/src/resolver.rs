//! Decision resolution.
//!
//! Combines every policy in a set into one [`Decision`]:
//!
//! 1. The [matcher](crate::matcher) keeps the applicable policies.
//! 2. The [evaluator](crate::evaluator) keeps those whose conditions hold.
//! 3. No satisfied policy: `NotApplicable`.
//! 4. Any satisfied `Deny`: `Deny`, decided by the highest-priority deny.
//!    Otherwise `Permit`, decided by the highest-priority allow.
//!
//! Ties between equal priorities go to the most recently updated policy,
//! then to the lowest id, so the same snapshot always yields the same
//! decision.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use echo_types::PolicyId;
use serde::{Deserialize, Serialize};

use crate::attributes::AccessRequest;
use crate::evaluator::{
    self, ConditionTrace, DEFAULT_ATTRIBUTE_TIMEOUT, EvaluationContext, LookupLimiter,
};
use crate::matcher::{self, Applicability};
use crate::operators::OperatorRegistry;
use crate::policy::{Effect, Obligation, Policy};
use crate::providers::AttributeProvider;

// ============================================================================
// Decision
// ============================================================================

/// Final outcome of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Permit,
    Deny,
    NotApplicable,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Permit => "permit",
            Self::Deny => "deny",
            Self::NotApplicable => "not_applicable",
        })
    }
}

/// How far a policy got during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    /// Excluded by the matcher; see [`TraceEntry::applicability`].
    NotApplicable,
    /// Applicable, but its conditions did not hold.
    ConditionsNotSatisfied,
    /// Satisfied, but another policy decided the outcome.
    Overridden,
    /// Decided the outcome.
    Decisive,
}

/// Resolution record for one policy of the evaluated set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub effect: Effect,
    pub applicable: bool,
    pub applicability: Applicability,
    /// `None` when the policy was not applicable and its conditions were
    /// never evaluated.
    pub condition_result: Option<bool>,
    pub stage: TraceStage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionTrace>,
}

/// The resolved access decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub matched_policy_id: Option<PolicyId>,
    /// Human-readable explanation of why this decision was made.
    pub reason: String,
    /// Obligations of the deciding policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    /// Advice of the deciding policy.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub advice: BTreeMap<String, String>,
    /// One entry per evaluated policy, in input order.
    pub trace: Vec<TraceEntry>,
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        self.outcome == Outcome::Permit
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves access requests against a policy set.
///
/// Holds everything evaluation needs besides the request and the policies:
/// the operator registry, the attribute provider for dynamic conditions,
/// and the per-request budget for resolving them.
#[derive(Clone)]
pub struct DecisionResolver {
    operators: OperatorRegistry,
    provider: Option<Arc<dyn AttributeProvider>>,
    lookups: Arc<LookupLimiter>,
    timeout: Duration,
}

impl DecisionResolver {
    pub fn new() -> Self {
        Self {
            operators: OperatorRegistry::standard(),
            provider: None,
            lookups: LookupLimiter::shared(),
            timeout: DEFAULT_ATTRIBUTE_TIMEOUT,
        }
    }

    pub fn with_operators(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_lookup_limiter(mut self, lookups: Arc<LookupLimiter>) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// Resolves `request` against `policies`.
    ///
    /// # Postcondition
    ///
    /// Always returns a `Decision` whose trace has exactly one entry per
    /// policy, in input order. Evaluation failures never surface as errors;
    /// they leave the affected policy unsatisfied.
    pub fn resolve(&self, request: &AccessRequest, policies: &[Policy]) -> Decision {
        let mut ctx = EvaluationContext::new(request, &self.operators)
            .with_timeout(self.timeout)
            .with_limiter(Arc::clone(&self.lookups));
        if let Some(provider) = &self.provider {
            ctx = ctx.with_provider(Arc::clone(provider));
        }

        let mut trace: Vec<TraceEntry> = policies
            .iter()
            .map(|policy| {
                let applicability = matcher::applicability(policy, request);
                let (condition_result, conditions, stage) = if applicability.is_applicable() {
                    let satisfied = evaluator::evaluate_all(&policy.conditions, &mut ctx);
                    let stage = if satisfied {
                        TraceStage::Overridden
                    } else {
                        TraceStage::ConditionsNotSatisfied
                    };
                    (Some(satisfied), ctx.take_trace(), stage)
                } else {
                    (None, Vec::new(), TraceStage::NotApplicable)
                };

                TraceEntry {
                    policy_id: policy.id,
                    policy_name: policy.name.clone(),
                    effect: policy.effect,
                    applicable: applicability.is_applicable(),
                    applicability,
                    condition_result,
                    stage,
                    conditions,
                }
            })
            .collect();

        let satisfied: Vec<usize> = trace
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.condition_result == Some(true))
            .map(|(index, _)| index)
            .collect();

        let decision = match select_decisive(policies, &satisfied) {
            None => {
                let applicable = trace.iter().filter(|entry| entry.applicable).count();
                let reason = if applicable == 0 {
                    "no applicable policy".to_string()
                } else {
                    format!("{applicable} applicable policies, none with satisfied conditions")
                };
                Decision {
                    outcome: Outcome::NotApplicable,
                    matched_policy_id: None,
                    reason,
                    obligations: Vec::new(),
                    advice: BTreeMap::new(),
                    trace,
                }
            }
            Some(index) => {
                let policy = &policies[index];
                trace[index].stage = TraceStage::Decisive;
                let (outcome, verb) = match policy.effect {
                    Effect::Deny => (Outcome::Deny, "denied"),
                    Effect::Allow => (Outcome::Permit, "permitted"),
                };
                Decision {
                    outcome,
                    matched_policy_id: Some(policy.id),
                    reason: format!(
                        "{verb} by policy '{}' (priority {})",
                        policy.name, policy.priority
                    ),
                    obligations: policy.obligations.clone(),
                    advice: policy.advice.clone(),
                    trace,
                }
            }
        };

        if decision.outcome == Outcome::Deny {
            tracing::info!(
                action = %request.action,
                outcome = ?decision.outcome,
                policy_id = ?decision.matched_policy_id,
                "access denied"
            );
        } else {
            tracing::debug!(
                action = %request.action,
                outcome = ?decision.outcome,
                policy_id = ?decision.matched_policy_id,
                evaluated = policies.len(),
                "access decision resolved"
            );
        }

        decision
    }
}

impl Default for DecisionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecisionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionResolver")
            .field("operators", &self.operators)
            .field("has_provider", &self.provider.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Resolves `request` against `policies` with the standard operators and no
/// attribute provider.
pub fn resolve(request: &AccessRequest, policies: &[Policy]) -> Decision {
    DecisionResolver::new().resolve(request, policies)
}

/// Index of the policy that decides the outcome, if any.
///
/// Deny overrides allow; within an effect the strongest policy wins.
fn select_decisive(policies: &[Policy], satisfied: &[usize]) -> Option<usize> {
    let strongest = |effect: Effect| {
        satisfied
            .iter()
            .copied()
            .filter(|&index| policies[index].effect == effect)
            .max_by(|&a, &b| precedence(&policies[a], &policies[b]))
    };
    strongest(Effect::Deny).or_else(|| strongest(Effect::Allow))
}

/// Orders policies of the same effect: higher priority, then later
/// `updated_at`, then lower id is greater.
fn precedence(a: &Policy, b: &Policy) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

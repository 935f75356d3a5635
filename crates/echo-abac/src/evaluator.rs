//! Condition tree evaluation.
//!
//! Evaluates a [`Condition`] tree against an [`AccessRequest`]. Evaluation is
//! fail-closed: any problem with a node (unknown operator, missing
//! attribute, provider failure or timeout, incomparable operands) makes that
//! node "not satisfied", logs a warning, and records the error in the trace.
//! Evaluation never panics and never returns an error.
//!
//! Dynamic attributes are resolved through the context's
//! [`AttributeProvider`]. Each provider call runs on a helper thread and is
//! bounded by whatever is left of the per-request budget. A call that
//! outlives its budget keeps its thread until the provider returns, so the
//! number of such threads is capped by a [`LookupLimiter`]; once the cap is
//! reached further lookups fail closed without spawning. Results, including
//! failures, are cached for the lifetime of the context so every reference
//! to the same attribute within one request sees the same value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::attributes::{AccessRequest, AttributeValue};
use crate::condition::{Condition, ConditionSet, LogicalOperator};
use crate::error::{EvaluationError, ProviderError};
use crate::operators::OperatorRegistry;
use crate::providers::AttributeProvider;

/// Default budget for resolving all dynamic attributes of one request.
pub const DEFAULT_ATTRIBUTE_TIMEOUT: Duration = Duration::from_millis(250);

/// Default cap on provider calls running at once across the process.
pub const DEFAULT_MAX_PENDING_LOOKUPS: usize = 64;

static SHARED_LIMITER: LazyLock<Arc<LookupLimiter>> =
    LazyLock::new(|| Arc::new(LookupLimiter::new(DEFAULT_MAX_PENDING_LOOKUPS)));

// ============================================================================
// Lookup Limiter
// ============================================================================

/// Caps the number of dynamic attribute lookups whose helper thread is still
/// running, including lookups whose caller already gave up on them.
#[derive(Debug)]
pub struct LookupLimiter {
    capacity: usize,
    in_flight: AtomicUsize,
}

impl LookupLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// The process-wide limiter used unless another one is configured.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_LIMITER)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Helper threads currently running a provider call.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_acquire(self: &Arc<Self>) -> Option<LookupPermit> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| LookupPermit(Arc::clone(self)))
    }
}

/// Slot held by a helper thread; released when the thread finishes.
struct LookupPermit(Arc<LookupLimiter>);

impl Drop for LookupPermit {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// Condition Trace
// ============================================================================

/// Outcome of a single condition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConditionStatus {
    Passed,
    Failed,
    /// Skipped by short-circuiting of an enclosing `AND`/`OR`.
    NotEvaluated,
    /// Could not be evaluated; counts as not satisfied.
    Error { error: EvaluationError },
}

impl ConditionStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// One node of an evaluated condition tree.
///
/// `path` locates the node: `"1"` is the second top-level condition of a
/// policy, `"1.0"` the first child of its group, and so on. Group nodes carry
/// their logical operator in `operator` and an empty `attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionTrace {
    pub path: String,
    pub attribute: String,
    pub operator: String,
    #[serde(flatten)]
    pub status: ConditionStatus,
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Per-request evaluation state.
///
/// Holds the request, the operator registry, the optional attribute
/// provider, the dynamic-attribute cache, and the trace of evaluated nodes.
/// Create one context per request and reuse it for every policy evaluated
/// for that request.
pub struct EvaluationContext<'a> {
    request: &'a AccessRequest,
    operators: &'a OperatorRegistry,
    provider: Option<Arc<dyn AttributeProvider>>,
    limiter: Arc<LookupLimiter>,
    timeout: Duration,
    started: Instant,
    cache: HashMap<String, Result<AttributeValue, EvaluationError>>,
    trace: Vec<ConditionTrace>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(request: &'a AccessRequest, operators: &'a OperatorRegistry) -> Self {
        Self {
            request,
            operators,
            provider: None,
            limiter: LookupLimiter::shared(),
            timeout: DEFAULT_ATTRIBUTE_TIMEOUT,
            started: Instant::now(),
            cache: HashMap::new(),
            trace: Vec::new(),
        }
    }

    /// Sets the provider used for dynamic attributes.
    pub fn with_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the limiter bounding helper threads for provider calls.
    pub fn with_limiter(mut self, limiter: Arc<LookupLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Sets the total budget for dynamic attribute resolution.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request(&self) -> &AccessRequest {
        self.request
    }

    /// Drains the trace recorded since the last call.
    pub fn take_trace(&mut self) -> Vec<ConditionTrace> {
        std::mem::take(&mut self.trace)
    }

    fn record(&mut self, path: &str, attribute: &str, operator: &str, status: ConditionStatus) {
        self.trace.push(ConditionTrace {
            path: path.to_string(),
            attribute: attribute.to_string(),
            operator: operator.to_string(),
            status,
        });
    }

    fn resolve(&mut self, condition: &Condition) -> Result<AttributeValue, EvaluationError> {
        if !condition.is_dynamic {
            return self.request.lookup(&condition.attribute).ok_or_else(|| {
                EvaluationError::MissingAttribute {
                    attribute: condition.attribute.clone(),
                }
            });
        }

        if let Some(cached) = self.cache.get(&condition.attribute) {
            return cached.clone();
        }

        let resolved = self.resolve_dynamic(&condition.attribute);
        self.cache
            .insert(condition.attribute.clone(), resolved.clone());
        resolved
    }

    fn resolve_dynamic(&self, attribute: &str) -> Result<AttributeValue, EvaluationError> {
        let Some(provider) = self.provider.clone() else {
            return Err(EvaluationError::NoProvider {
                attribute: attribute.to_string(),
            });
        };

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let timed_out = || EvaluationError::Timeout {
            attribute: attribute.to_string(),
            timeout_ms,
        };

        let remaining = self
            .timeout
            .saturating_sub(self.started.elapsed());
        if remaining.is_zero() {
            return Err(timed_out());
        }

        let Some(permit) = self.limiter.try_acquire() else {
            return Err(EvaluationError::ProviderFailed {
                attribute: attribute.to_string(),
                reason: format!(
                    "{} provider calls already pending",
                    self.limiter.capacity()
                ),
            });
        };

        let (tx, rx) = mpsc::channel();
        let name = attribute.to_string();
        let request = self.request.clone();
        thread::Builder::new()
            .name("echo-attr-resolve".to_string())
            .spawn(move || {
                let _permit = permit;
                // The receiver is gone once the budget expired; the late result is dropped.
                let _ = tx.send(provider.resolve(&name, &request));
            })
            .map_err(|e| EvaluationError::ProviderFailed {
                attribute: attribute.to_string(),
                reason: format!("failed to spawn resolver thread: {e}"),
            })?;

        match rx.recv_timeout(remaining) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ProviderError::UnknownAttribute(_))) => Err(EvaluationError::ProviderFailed {
                attribute: attribute.to_string(),
                reason: "attribute unknown to provider".to_string(),
            }),
            Ok(Err(ProviderError::Unavailable(reason))) => Err(EvaluationError::ProviderFailed {
                attribute: attribute.to_string(),
                reason,
            }),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(timed_out()),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EvaluationError::ProviderFailed {
                attribute: attribute.to_string(),
                reason: "provider terminated without a result".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("action", &self.request.action)
            .field("has_provider", &self.provider.is_some())
            .field("timeout", &self.timeout)
            .field("pending_lookups", &self.limiter.in_flight())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Evaluates a single condition tree.
///
/// # Postcondition
///
/// Always returns a `bool` -- never panics, never errors. Failures count as
/// `false` and are recorded in the context's trace.
pub fn evaluate(condition: &Condition, ctx: &mut EvaluationContext<'_>) -> bool {
    evaluate_node(condition, "0", ctx)
}

/// Evaluates a policy's condition list, which is an implicit `AND`.
///
/// An empty list is satisfied.
pub fn evaluate_all(conditions: &[Condition], ctx: &mut EvaluationContext<'_>) -> bool {
    evaluate_children(LogicalOperator::And, conditions, "", ctx)
}

// ============================================================================
// Tree Walk
// ============================================================================

fn evaluate_node(condition: &Condition, path: &str, ctx: &mut EvaluationContext<'_>) -> bool {
    match &condition.sub_conditions {
        Some(set) => evaluate_set(set, path, ctx),
        None => evaluate_leaf(condition, path, ctx),
    }
}

fn evaluate_set(set: &ConditionSet, path: &str, ctx: &mut EvaluationContext<'_>) -> bool {
    // Reserve the group's slot so it precedes its children in the trace.
    let slot = ctx.trace.len();
    ctx.record(path, "", operator_label(set.operator), ConditionStatus::NotEvaluated);

    let result = evaluate_children(set.operator, &set.conditions, path, ctx);

    ctx.trace[slot].status = if result {
        ConditionStatus::Passed
    } else {
        ConditionStatus::Failed
    };
    result
}

fn evaluate_children(
    operator: LogicalOperator,
    conditions: &[Condition],
    parent: &str,
    ctx: &mut EvaluationContext<'_>,
) -> bool {
    let short_circuit_on = match operator {
        LogicalOperator::And => false,
        LogicalOperator::Or => true,
    };

    for (index, child) in conditions.iter().enumerate() {
        let path = child_path(parent, index);
        if evaluate_node(child, &path, ctx) == short_circuit_on {
            for (skipped_index, skipped) in conditions.iter().enumerate().skip(index + 1) {
                mark_skipped(skipped, &child_path(parent, skipped_index), ctx);
            }
            return short_circuit_on;
        }
    }

    // Empty AND holds, empty OR does not.
    !short_circuit_on
}

fn evaluate_leaf(condition: &Condition, path: &str, ctx: &mut EvaluationContext<'_>) -> bool {
    let status = match check_leaf(condition, ctx) {
        Ok(true) => ConditionStatus::Passed,
        Ok(false) => ConditionStatus::Failed,
        Err(error) => {
            tracing::warn!(
                attribute = %condition.attribute,
                operator = %condition.operator,
                path,
                error = %error,
                "condition evaluation failed; treating as not satisfied"
            );
            ConditionStatus::Error { error }
        }
    };

    let passed = status.is_passed();
    ctx.record(path, &condition.attribute, &condition.operator, status);
    passed
}

fn check_leaf(condition: &Condition, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvaluationError> {
    if condition.attribute.is_empty() {
        return Err(EvaluationError::Malformed {
            reason: "leaf condition has no attribute".to_string(),
        });
    }
    // Checked before resolution so an unknown operator never triggers a provider call.
    if !ctx.operators.contains(&condition.operator) {
        return Err(EvaluationError::UnknownOperator {
            operator: condition.operator.clone(),
        });
    }

    let actual = ctx.resolve(condition)?;
    ctx.operators
        .apply(&condition.operator, &actual, &condition.value)
}

fn mark_skipped(condition: &Condition, path: &str, ctx: &mut EvaluationContext<'_>) {
    match &condition.sub_conditions {
        Some(set) => {
            ctx.record(path, "", operator_label(set.operator), ConditionStatus::NotEvaluated);
            for (index, child) in set.conditions.iter().enumerate() {
                mark_skipped(child, &child_path(path, index), ctx);
            }
        }
        None => ctx.record(
            path,
            &condition.attribute,
            &condition.operator,
            ConditionStatus::NotEvaluated,
        ),
    }
}

fn child_path(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        index.to_string()
    } else {
        format!("{parent}.{index}")
    }
}

fn operator_label(operator: LogicalOperator) -> &'static str {
    match operator {
        LogicalOperator::And => "AND",
        LogicalOperator::Or => "OR",
    }
}

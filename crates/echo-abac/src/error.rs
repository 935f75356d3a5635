//! Error types for policy validation and condition evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A policy failed structural validation.
///
/// Validation runs before any persistence attempt; an invalid policy is
/// never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("policy name cannot be empty")]
    EmptyName,

    #[error("policy effect must be either 'allow' or 'deny', got {0:?}")]
    UnrecognizedEffect(String),

    #[error("policy priority cannot be negative, got {0}")]
    NegativePriority(i64),

    #[error("policy must have at least one subject")]
    NoSubjects,

    #[error("policy must have at least one resource")]
    NoResources,

    #[error("policy must have at least one action")]
    NoActions,

    #[error("{0} matcher type cannot be empty")]
    EmptyMatcherType(&'static str),

    #[error("deactivation date must be after activation date")]
    InvertedActivationWindow,
}

/// A single condition could not be evaluated.
///
/// Never propagated as a failure of the whole decision: the affected
/// condition resolves to "not satisfied" and the error is recorded in the
/// decision trace.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationError {
    #[error("unknown operator {operator:?}")]
    UnknownOperator { operator: String },

    #[error("attribute {attribute:?} is not present in the request")]
    MissingAttribute { attribute: String },

    #[error("no attribute provider available for dynamic attribute {attribute:?}")]
    NoProvider { attribute: String },

    #[error("attribute provider could not resolve {attribute:?}: {reason}")]
    ProviderFailed { attribute: String, reason: String },

    #[error("resolving dynamic attribute {attribute:?} exceeded the {timeout_ms}ms budget")]
    Timeout { attribute: String, timeout_ms: u64 },

    #[error("operator {operator:?} cannot compare {left} with {right}")]
    TypeMismatch {
        operator: String,
        left: String,
        right: String,
    },

    #[error("malformed condition: {reason}")]
    Malformed { reason: String },
}

impl EvaluationError {
    pub(crate) fn type_mismatch(operator: &str, left: &str, right: &str) -> Self {
        Self::TypeMismatch {
            operator: operator.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

/// An attribute provider could not supply a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("attribute {0:?} is not known to this provider")]
    UnknownAttribute(String),

    #[error("attribute source unavailable: {0}")]
    Unavailable(String),
}

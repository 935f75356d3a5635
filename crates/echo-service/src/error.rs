//! Errors returned by the policy service.

use echo_abac::conflict::Conflict;
use echo_abac::error::ValidationError;
use echo_types::{PolicyId, PolicyVersion};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("invalid policy: {0}")]
    Validation(#[from] ValidationError),

    #[error("policy conflicts with {} existing {}", conflicts.len(), if conflicts.len() == 1 { "policy" } else { "policies" })]
    Conflict { conflicts: Vec<Conflict> },

    #[error("policy {id} was modified concurrently: expected {expected}, found {actual}")]
    VersionConflict {
        id: PolicyId,
        expected: PolicyVersion,
        actual: PolicyVersion,
    },

    #[error("policy {0} not found")]
    NotFound(PolicyId),

    #[error("policy store error: {0}")]
    Store(StoreError),

    #[error("failed to start bulk worker pool: {0}")]
    WorkerPool(String),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::VersionConflict {
                id,
                expected,
                actual,
            },
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl ServiceError {
    /// Whether a re-read and retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

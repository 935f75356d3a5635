//! # echo-types: Core types for `Echo`
//!
//! This crate contains the identity types shared across the `Echo` policy
//! system:
//! - Policy identity ([`PolicyId`])
//! - Optimistic-concurrency versions ([`PolicyVersion`])
//! - Id parse failures ([`ParseIdError`])

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Entity IDs - All Copy (16-byte values)
// ============================================================================

/// Unique identifier for a policy.
///
/// Backed by a UUID. Ordering follows the UUID's byte ordering, which the
/// decision resolver relies on as its final deterministic tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(Uuid);

impl PolicyId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random policy id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds an id from a raw 128-bit value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use echo_types::PolicyId;
    /// let id = PolicyId::from_u128(2);
    /// assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000002");
    /// ```
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PolicyId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

impl From<Uuid> for PolicyId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PolicyId> for Uuid {
    fn from(id: PolicyId) -> Self {
        id.0
    }
}

/// Error returned when a string is not a valid policy id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError(String);

impl Display for ParseIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid policy id: {:?}", self.0)
    }
}

impl std::error::Error for ParseIdError {}

// ============================================================================
// Versions - Copy (monotonic counters)
// ============================================================================

/// Monotonic policy version used for optimistic concurrency.
///
/// A policy is created at [`PolicyVersion::INITIAL`] and every persisted
/// update advances it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PolicyVersion(u64);

impl PolicyVersion {
    /// Version stamped on a newly created policy.
    pub const INITIAL: PolicyVersion = PolicyVersion(1);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the version following this one.
    ///
    /// # Panics
    ///
    /// Panics if the version counter would overflow `u64`.
    pub fn next(self) -> Self {
        Self(
            self.0
                .checked_add(1)
                .expect("policy version overflow"),
        )
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for PolicyVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl Display for PolicyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for PolicyVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PolicyVersion> for u64 {
    fn from(version: PolicyVersion) -> Self {
        version.0
    }
}

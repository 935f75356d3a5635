//! Immutable policy snapshots.
//!
//! Decisions are made against a [`PolicySnapshot`]: a frozen, `Arc`-shared
//! view of the policy set. Writers build a complete new set and publish it
//! through a [`SnapshotPublisher`]; readers clone the current `Arc` and keep
//! evaluating against it even while a newer snapshot is published.
//!
//! ```text
//!   writer ── publish(new set) ──▶ RwLock<Arc<PolicySnapshot>>
//!                                        │ clone Arc
//!                          ┌─────────────┼─────────────┐
//!                          ▼             ▼             ▼
//!                      reader 1      reader 2      reader 3
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use echo_types::PolicyId;

use crate::policy::Policy;

/// A frozen policy set.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySnapshot {
    generation: u64,
    policies: Vec<Policy>,
}

impl PolicySnapshot {
    /// Creates a generation-0 snapshot.
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            generation: 0,
            policies,
        }
    }

    /// Publication counter; every publish increments it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn get(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Holds the current snapshot and swaps it atomically on publish.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl SnapshotPublisher {
    pub fn new(initial: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<PolicySnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replaces the current snapshot with `policies` and returns the new
    /// generation.
    pub fn publish(&self, policies: Vec<Policy>) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        *guard = Arc::new(PolicySnapshot {
            generation,
            policies,
        });
        drop(guard);

        tracing::debug!(generation, "policy snapshot published");
        generation
    }
}

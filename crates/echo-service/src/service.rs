//! Policy write flow.
//!
//! ```text
//! candidate ─▶ validate ─▶ detect conflicts ─▶ prepare version ─▶ store.put
//!                                                                    │
//!                           listeners ◀── emit event ◀── republish snapshot
//! ```
//!
//! Validation and conflict detection run before anything is persisted.
//! Conflict detection and the store write happen under one write lock, so
//! concurrent writers (including bulk workers) always check against each
//! other's committed policies. The snapshot is republished and listeners
//! are notified only after the store accepted the write, and neither step
//! can fail it: a failed republish is logged and the next write retries it.
//! Republishing reads the store and swaps the snapshot under a separate
//! lock, so a slow writer can never publish an older view over a newer one.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use echo_abac::conflict::{self, Conflict};
use echo_abac::policy::Policy;
use echo_abac::snapshot::SnapshotPublisher;
use echo_abac::version::prepare_update;
use echo_config::{ConflictMode, EchoConfig};
use echo_types::{PolicyId, PolicyVersion};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::ServiceError;
use crate::events::{EventDispatcher, PolicyEvent, PolicyListener};
use crate::store::{PolicyFilter, PolicyStore};

/// Default worker count for bulk writes.
pub const DEFAULT_BULK_CONCURRENCY: usize = 10;

// ============================================================================
// Options & Outcomes
// ============================================================================

/// Write-path settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub conflict_mode: ConflictMode,
    pub bulk_concurrency: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            conflict_mode: ConflictMode::Reject,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }
}

impl From<&EchoConfig> for ServiceOptions {
    fn from(config: &EchoConfig) -> Self {
        Self {
            conflict_mode: config.authoring.conflict_mode,
            bulk_concurrency: config.authoring.bulk_concurrency,
        }
    }
}

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// The stored record (unchanged stored record for a no-op update).
    pub policy: Policy,
    /// `false` for a no-op update.
    pub persisted: bool,
    pub changed_fields: Vec<&'static str>,
    /// Conflicts tolerated under [`ConflictMode::Warn`].
    pub conflicts: Vec<Conflict>,
}

/// Structural summary of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyUsage {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub version: PolicyVersion,
    pub subject_count: usize,
    pub resource_count: usize,
    pub action_count: usize,
    /// Leaf comparisons across all condition trees.
    pub condition_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

// ============================================================================
// Service
// ============================================================================

/// Validated, versioned, conflict-checked policy writes.
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    publisher: Arc<SnapshotPublisher>,
    events: EventDispatcher,
    options: ServiceOptions,
    pool: rayon::ThreadPool,
    /// Held from conflict detection through the store write.
    write_lock: Mutex<()>,
    /// Held from the store read through the snapshot swap.
    publish_lock: Mutex<()>,
}

impl PolicyService {
    /// Creates a service over `store` and publishes its initial snapshot.
    pub fn new(store: Arc<dyn PolicyStore>, options: ServiceOptions) -> Result<Self, ServiceError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.bulk_concurrency.max(1))
            .thread_name(|index| format!("echo-bulk-{index}"))
            .build()
            .map_err(|e| ServiceError::WorkerPool(e.to_string()))?;

        let service = Self {
            store,
            publisher: Arc::new(SnapshotPublisher::default()),
            events: EventDispatcher::new(),
            options,
            pool,
            write_lock: Mutex::new(()),
            publish_lock: Mutex::new(()),
        };
        service.refresh_snapshot()?;
        Ok(service)
    }

    /// Publisher holding the snapshot decisions are made against.
    pub fn publisher(&self) -> Arc<SnapshotPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn options(&self) -> ServiceOptions {
        self.options
    }

    pub fn subscribe(&self, name: &str, listener: Arc<dyn PolicyListener>) {
        self.events.subscribe(name, listener);
    }

    /// Rebuilds the snapshot from the store and returns its generation.
    ///
    /// Refreshes are serialized, so each published snapshot reflects a store
    /// read no older than the one before it.
    pub fn refresh_snapshot(&self) -> Result<u64, ServiceError> {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let policies = self.store.all()?;
        Ok(self.publisher.publish(policies))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get(&self, id: PolicyId) -> Result<Policy, ServiceError> {
        self.store.get(id)?.ok_or(ServiceError::NotFound(id))
    }

    pub fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ServiceError> {
        Ok(self.store.list(filter)?)
    }

    pub fn usage(&self, id: PolicyId) -> Result<PolicyUsage, ServiceError> {
        let policy = self.get(id)?;
        Ok(PolicyUsage {
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            version: policy.version,
            subject_count: policy.subjects.len(),
            resource_count: policy.resources.len(),
            action_count: policy.actions.len(),
            condition_count: policy.conditions.iter().map(|c| c.leaf_count()).sum(),
            created_at: policy.created_at,
            last_updated_at: policy.updated_at,
        })
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Creates `policy` at version 1.
    pub fn create(&self, policy: Policy) -> Result<WriteOutcome, ServiceError> {
        let outcome = self.create_unpublished(policy)?;
        self.republish("create");
        self.emit(&PolicyEvent::Created {
            policy: outcome.policy.clone(),
        });
        Ok(outcome)
    }

    /// Updates the stored policy with `policy.id`, provided it is still at
    /// `expected_version`.
    pub fn update(&self, policy: Policy, expected_version: PolicyVersion) -> Result<WriteOutcome, ServiceError> {
        let (outcome, old) = self.update_unpublished(policy, expected_version)?;
        if let Some(old) = old {
            self.republish("update");
            self.emit(&PolicyEvent::Updated {
                old,
                new: outcome.policy.clone(),
            });
        }
        Ok(outcome)
    }

    /// Read-modify-write with retry on concurrent modification.
    ///
    /// Re-reads the stored policy on every attempt and applies `mutate` to a
    /// fresh copy. Gives up after `attempts` version conflicts.
    pub fn update_with_retry<F>(&self, id: PolicyId, attempts: usize, mut mutate: F) -> Result<WriteOutcome, ServiceError>
    where
        F: FnMut(&mut Policy),
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            let stored = self.get(id)?;
            let mut candidate = stored.clone();
            mutate(&mut candidate);

            match self.update(candidate, stored.version) {
                Err(error) if error.is_retryable() && attempt < attempts => {
                    tracing::debug!(policy_id = %id, attempt, "version conflict, retrying update");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Deletes a policy. It stops matching as soon as this returns.
    pub fn delete(&self, id: PolicyId) -> Result<Policy, ServiceError> {
        let removed = self.store.delete(id)?;
        tracing::info!(policy_id = %id, "policy deleted");
        self.republish("delete");
        self.emit(&PolicyEvent::Deleted {
            policy: removed.clone(),
        });
        Ok(removed)
    }

    /// Creates policies on the bulk worker pool.
    ///
    /// Under [`ConflictMode::Reject`] a batch whose members conflict with
    /// each other is rejected before anything is written. Otherwise returns
    /// the first error; queued work after it is skipped, and policies
    /// already written stay written. The snapshot is republished once,
    /// whatever the result.
    pub fn bulk_create(&self, policies: Vec<Policy>) -> Result<Vec<WriteOutcome>, ServiceError> {
        let count = policies.len();
        if self.options.conflict_mode == ConflictMode::Reject {
            check_batch_conflicts(&policies, Utc::now())?;
        }
        let result = self.pool.install(|| {
            policies
                .into_par_iter()
                .map(|policy| {
                    let outcome = self.create_unpublished(policy)?;
                    self.emit(&PolicyEvent::Created {
                        policy: outcome.policy.clone(),
                    });
                    Ok(outcome)
                })
                .collect::<Result<Vec<_>, ServiceError>>()
        });
        self.finish_bulk("bulk create", count, result)
    }

    /// Updates policies on the bulk worker pool; see [`bulk_create`](Self::bulk_create).
    pub fn bulk_update(&self, updates: Vec<(Policy, PolicyVersion)>) -> Result<Vec<WriteOutcome>, ServiceError> {
        let count = updates.len();
        let result = self.pool.install(|| {
            updates
                .into_par_iter()
                .map(|(policy, expected)| {
                    let (outcome, old) = self.update_unpublished(policy, expected)?;
                    if let Some(old) = old {
                        self.emit(&PolicyEvent::Updated {
                            old,
                            new: outcome.policy.clone(),
                        });
                    }
                    Ok(outcome)
                })
                .collect::<Result<Vec<_>, ServiceError>>()
        });
        self.finish_bulk("bulk update", count, result)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn finish_bulk(
        &self,
        operation: &'static str,
        count: usize,
        result: Result<Vec<WriteOutcome>, ServiceError>,
    ) -> Result<Vec<WriteOutcome>, ServiceError> {
        self.republish(operation);
        match &result {
            Ok(outcomes) => tracing::info!(operation, count, written = outcomes.len(), "bulk write complete"),
            Err(error) => tracing::warn!(operation, count, error = %error, "bulk write stopped"),
        }
        result
    }

    /// Refreshes the snapshot after a committed write.
    ///
    /// The write already succeeded, so a failure only leaves the snapshot
    /// stale until the next refresh.
    fn republish(&self, operation: &'static str) {
        if let Err(error) = self.refresh_snapshot() {
            tracing::warn!(
                operation,
                error = %error,
                generation = self.publisher.current().generation(),
                "snapshot refresh failed after committed write"
            );
        }
    }

    fn create_unpublished(&self, mut policy: Policy) -> Result<WriteOutcome, ServiceError> {
        policy.validate()?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let conflicts = self.check_conflicts(&policy, now)?;

        policy.version = PolicyVersion::INITIAL;
        policy.created_at = now;
        policy.updated_at = now;

        let stored = self.store.put(policy, None)?;
        tracing::info!(
            policy_id = %stored.id,
            name = %stored.name,
            effect = %stored.effect,
            "policy created"
        );

        Ok(WriteOutcome {
            policy: stored,
            persisted: true,
            changed_fields: Vec::new(),
            conflicts,
        })
    }

    /// Returns the outcome and, when something was written, the previous record.
    fn update_unpublished(
        &self,
        policy: Policy,
        expected_version: PolicyVersion,
    ) -> Result<(WriteOutcome, Option<Policy>), ServiceError> {
        policy.validate()?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self.get(policy.id)?;
        if stored.version != expected_version {
            return Err(ServiceError::VersionConflict {
                id: stored.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let now = Utc::now();
        let conflicts = self.check_conflicts(&policy, now)?;

        let prepared = prepare_update(&stored, &policy, now);
        if !prepared.should_persist {
            tracing::debug!(policy_id = %stored.id, "update changes nothing; skipped");
            return Ok((
                WriteOutcome {
                    policy: stored,
                    persisted: false,
                    changed_fields: Vec::new(),
                    conflicts,
                },
                None,
            ));
        }

        let written = self.store.put(prepared.policy, Some(stored.version))?;
        tracing::info!(
            policy_id = %written.id,
            version = %written.version,
            changed = ?prepared.changed_fields,
            "policy updated"
        );

        Ok((
            WriteOutcome {
                policy: written,
                persisted: true,
                changed_fields: prepared.changed_fields,
                conflicts,
            },
            Some(stored),
        ))
    }

    fn check_conflicts(&self, candidate: &Policy, now: DateTime<Utc>) -> Result<Vec<Conflict>, ServiceError> {
        let existing = self.store.all()?;
        let conflicts = conflict::detect_conflicts(candidate, &existing, now);
        if conflicts.is_empty() {
            return Ok(conflicts);
        }

        match self.options.conflict_mode {
            ConflictMode::Reject => Err(ServiceError::Conflict { conflicts }),
            ConflictMode::Warn => {
                tracing::warn!(
                    policy_id = %candidate.id,
                    conflicts = conflicts.len(),
                    "persisting policy despite conflicts"
                );
                Ok(conflicts)
            }
        }
    }

    fn emit(&self, event: &PolicyEvent) {
        let report = self.events.dispatch(event);
        if !report.failed.is_empty() {
            tracing::debug!(
                event = event.name(),
                failed = report.failed.len(),
                delivered = report.delivered,
                "event delivered with listener failures"
            );
        }
    }
}

/// Rejects a batch in which some candidate conflicts with an earlier one.
fn check_batch_conflicts(candidates: &[Policy], now: DateTime<Utc>) -> Result<(), ServiceError> {
    for (index, candidate) in candidates.iter().enumerate() {
        let conflicts = conflict::detect_conflicts(candidate, &candidates[..index], now);
        if !conflicts.is_empty() {
            tracing::warn!(
                policy_id = %candidate.id,
                conflicts = conflicts.len(),
                "bulk create rejected; batch conflicts with itself"
            );
            return Err(ServiceError::Conflict { conflicts });
        }
    }
    Ok(())
}

impl std::fmt::Debug for PolicyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyService")
            .field("options", &self.options)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;

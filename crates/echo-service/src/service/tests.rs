use super::*;
use crate::events::ListenerError;
use crate::store::{InMemoryPolicyStore, StoreError};
use echo_abac::condition::Condition;
use echo_abac::error::ValidationError;
use echo_abac::policy::{Effect, EntityMatcher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn policy(name: &str, effect: Effect, priority: i64) -> Policy {
    Policy::new(name, effect)
        .with_subject(EntityMatcher::new("user").with_attribute("department", "engineering"))
        .with_resource(EntityMatcher::new("document"))
        .with_action("read")
        .with_priority(priority)
}

fn service_with(options: ServiceOptions) -> PolicyService {
    PolicyService::new(Arc::new(InMemoryPolicyStore::new()), options).unwrap()
}

fn service() -> PolicyService {
    service_with(ServiceOptions::default())
}

/// In-memory store whose reads can be slowed down or broken after a write.
#[derive(Debug, Default)]
struct Flaky {
    inner: InMemoryPolicyStore,
    /// Every `list` sleeps this long after reading.
    list_delay: Mutex<Duration>,
    /// The first `list` after the next `put` sleeps after reading.
    stall_after_put: AtomicBool,
    stall_pending: AtomicBool,
    stalled: AtomicBool,
    /// Every `list` after the next `put` fails.
    fail_after_put: AtomicBool,
    failing: AtomicBool,
}

impl Flaky {
    fn with_list_delay(delay: Duration) -> Self {
        Self {
            list_delay: Mutex::new(delay),
            ..Self::default()
        }
    }
}

impl PolicyStore for Flaky {
    fn get(&self, id: PolicyId) -> Result<Option<Policy>, StoreError> {
        self.inner.get(id)
    }

    fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("replica offline".into()));
        }
        let policies = self.inner.list(filter)?;
        thread::sleep(*self.list_delay.lock().unwrap());
        if self.stall_pending.swap(false, Ordering::SeqCst) {
            self.stalled.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
        }
        Ok(policies)
    }

    fn put(&self, policy: Policy, expected_version: Option<PolicyVersion>) -> Result<Policy, StoreError> {
        let stored = self.inner.put(policy, expected_version)?;
        if self.stall_after_put.swap(false, Ordering::SeqCst) {
            self.stall_pending.store(true, Ordering::SeqCst);
        }
        if self.fail_after_put.swap(false, Ordering::SeqCst) {
            self.failing.store(true, Ordering::SeqCst);
        }
        Ok(stored)
    }

    fn delete(&self, id: PolicyId) -> Result<Policy, StoreError> {
        self.inner.delete(id)
    }
}

fn sorted_ids(policies: &[Policy]) -> Vec<PolicyId> {
    let mut ids: Vec<PolicyId> = policies.iter().map(|p| p.id).collect();
    ids.sort();
    ids
}

/// Records event names in delivery order.
fn recorder(service: &PolicyService) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    service.subscribe(
        "recorder",
        Arc::new(move |event: &PolicyEvent| -> Result<(), ListenerError> {
            sink.lock().unwrap().push(event.name());
            Ok(())
        }),
    );
    seen
}

// ============================================================================
// Create
// ============================================================================

#[test]
fn test_create_stamps_version_and_publishes() {
    let service = service();
    let seen = recorder(&service);
    let generation = service.publisher().current().generation();

    let outcome = service.create(policy("engineers-read", Effect::Allow, 5)).unwrap();

    assert!(outcome.persisted);
    assert_eq!(outcome.policy.version, PolicyVersion::INITIAL);
    assert_eq!(outcome.policy.created_at, outcome.policy.updated_at);
    assert!(outcome.conflicts.is_empty());

    let snapshot = service.publisher().current();
    assert_eq!(snapshot.generation(), generation + 1);
    assert!(snapshot.get(outcome.policy.id).is_some());
    assert_eq!(*seen.lock().unwrap(), vec!["policy.created"]);
}

#[test]
fn test_create_rejects_invalid_policy_without_side_effects() {
    let service = service();
    let seen = recorder(&service);
    let generation = service.publisher().current().generation();

    let err = service
        .create(Policy::new("no-subjects", Effect::Allow).with_action("read"))
        .unwrap_err();

    assert_eq!(err, ServiceError::Validation(ValidationError::NoSubjects));
    assert!(service.list(&PolicyFilter::new()).unwrap().is_empty());
    assert_eq!(service.publisher().current().generation(), generation);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_conflict_rejected_by_default() {
    let service = service();
    let allow = service.create(policy("allow", Effect::Allow, 5)).unwrap().policy;

    let err = service.create(policy("deny", Effect::Deny, 5)).unwrap_err();
    match err {
        ServiceError::Conflict { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].policy_id, allow.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(service.list(&PolicyFilter::new()).unwrap().len(), 1);
}

#[test]
fn test_conflict_tolerated_in_warn_mode() {
    let service = service_with(ServiceOptions {
        conflict_mode: ConflictMode::Warn,
        ..ServiceOptions::default()
    });
    service.create(policy("allow", Effect::Allow, 5)).unwrap();

    let outcome = service.create(policy("deny", Effect::Deny, 5)).unwrap();
    assert!(outcome.persisted);
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(service.publisher().current().len(), 2);
}

#[test]
fn test_different_priorities_do_not_conflict() {
    let service = service();
    service.create(policy("allow", Effect::Allow, 5)).unwrap();
    assert!(service.create(policy("deny", Effect::Deny, 6)).is_ok());
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn test_update_advances_version_by_one() {
    let service = service();
    let seen = recorder(&service);
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;

    let edited = created.clone().with_priority(7);
    let outcome = service.update(edited, created.version).unwrap();

    assert!(outcome.persisted);
    assert_eq!(outcome.changed_fields, vec!["priority"]);
    assert_eq!(outcome.policy.version, PolicyVersion::new(2));
    assert_eq!(outcome.policy.created_at, created.created_at);
    assert_eq!(service.get(created.id).unwrap().priority, 7);
    assert_eq!(*seen.lock().unwrap(), vec!["policy.created", "policy.updated"]);
}

#[test]
fn test_noop_update_writes_nothing() {
    let service = service();
    let seen = recorder(&service);
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;
    let generation = service.publisher().current().generation();

    let outcome = service.update(created.clone(), created.version).unwrap();

    assert!(!outcome.persisted);
    assert_eq!(outcome.policy, created);
    assert_eq!(service.get(created.id).unwrap().version, PolicyVersion::INITIAL);
    assert_eq!(service.publisher().current().generation(), generation);
    assert_eq!(*seen.lock().unwrap(), vec!["policy.created"]);
}

#[test]
fn test_stale_update_is_a_version_conflict() {
    let service = service();
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;
    service
        .update(created.clone().with_priority(2), created.version)
        .unwrap();

    let err = service
        .update(created.clone().with_priority(3), created.version)
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::VersionConflict {
            id: created.id,
            expected: PolicyVersion::INITIAL,
            actual: PolicyVersion::new(2),
        }
    );
    assert!(err.is_retryable());
    assert_eq!(service.get(created.id).unwrap().priority, 2);
}

#[test]
fn test_update_of_missing_policy() {
    let service = service();
    let ghost = policy("ghost", Effect::Allow, 1).with_id(PolicyId::from_u128(42));
    assert_eq!(
        service.update(ghost, PolicyVersion::INITIAL),
        Err(ServiceError::NotFound(PolicyId::from_u128(42)))
    );
}

#[test]
fn test_update_with_retry_applies_mutation_to_fresh_copy() {
    let service = service();
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;

    let outcome = service
        .update_with_retry(created.id, 3, |p| {
            p.priority += 10;
        })
        .unwrap();
    assert_eq!(outcome.policy.priority, 11);
    assert_eq!(outcome.policy.version, PolicyVersion::new(2));
}

// ============================================================================
// Delete, Reads
// ============================================================================

#[test]
fn test_delete_removes_from_snapshot() {
    let service = service();
    let seen = recorder(&service);
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;

    let removed = service.delete(created.id).unwrap();
    assert_eq!(removed.id, created.id);
    assert!(service.publisher().current().get(created.id).is_none());
    assert_eq!(service.get(created.id), Err(ServiceError::NotFound(created.id)));
    assert_eq!(service.delete(created.id), Err(ServiceError::NotFound(created.id)));
    assert_eq!(*seen.lock().unwrap(), vec!["policy.created", "policy.deleted"]);
}

#[test]
fn test_usage_counts_leaf_conditions() {
    let service = service();
    let created = service
        .create(
            policy("p", Effect::Allow, 1)
                .with_action("write")
                .with_condition(Condition::new("subject.clearance", "greaterThan", 2))
                .with_condition(Condition::any(vec![
                    Condition::new("environment.ip_address", "startsWith", "10."),
                    Condition::new("environment.vpn", "equals", true),
                ])),
        )
        .unwrap()
        .policy;

    let usage = service.usage(created.id).unwrap();
    assert_eq!(usage.policy_name, "p");
    assert_eq!(usage.subject_count, 1);
    assert_eq!(usage.resource_count, 1);
    assert_eq!(usage.action_count, 2);
    assert_eq!(usage.condition_count, 3);
    assert_eq!(usage.version, PolicyVersion::INITIAL);
}

#[test]
fn test_initial_snapshot_reflects_store() {
    let seeded = policy("seeded", Effect::Allow, 1);
    let store = Arc::new(InMemoryPolicyStore::with_policies([seeded.clone()]));
    let service = PolicyService::new(store, ServiceOptions::default()).unwrap();

    let snapshot = service.publisher().current();
    assert_eq!(snapshot.generation(), 1);
    assert!(snapshot.get(seeded.id).is_some());
}

#[test]
fn test_slow_refresh_cannot_resurrect_deleted_policy() {
    let store = Arc::new(Flaky::default());
    let service = PolicyService::new(store.clone(), ServiceOptions::default()).unwrap();
    let victim = service.create(policy("victim", Effect::Allow, 1)).unwrap().policy;

    // The create's refresh reads the store while the victim still exists,
    // then stalls while the delete runs.
    store.stall_after_put.store(true, Ordering::SeqCst);
    thread::scope(|scope| {
        let creator = scope.spawn(|| service.create(policy("other", Effect::Allow, 2)));
        while !store.stalled.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        service.delete(victim.id).unwrap();
        creator.join().unwrap().unwrap();
    });

    let snapshot = service.publisher().current();
    assert!(snapshot.get(victim.id).is_none());
    assert_eq!(sorted_ids(snapshot.policies()), sorted_ids(&store.all().unwrap()));
}

#[test]
fn test_refresh_failure_after_commit_keeps_write() {
    let store = Arc::new(Flaky::default());
    let service = PolicyService::new(store.clone(), ServiceOptions::default()).unwrap();
    let seen = recorder(&service);
    let generation = service.publisher().current().generation();

    store.fail_after_put.store(true, Ordering::SeqCst);
    let outcome = service.create(policy("p", Effect::Allow, 1)).unwrap();

    assert!(outcome.persisted);
    assert_eq!(service.get(outcome.policy.id).unwrap(), outcome.policy);
    assert_eq!(*seen.lock().unwrap(), vec!["policy.created"]);
    // Snapshot stays stale until the store can be read again.
    assert_eq!(service.publisher().current().generation(), generation);

    store.failing.store(false, Ordering::SeqCst);
    service.refresh_snapshot().unwrap();
    assert!(service.publisher().current().get(outcome.policy.id).is_some());
}

#[test]
fn test_refresh_failure_after_delete_keeps_delete() {
    let store = Arc::new(Flaky::default());
    let service = PolicyService::new(store.clone(), ServiceOptions::default()).unwrap();
    let created = service.create(policy("p", Effect::Allow, 1)).unwrap().policy;

    store.failing.store(true, Ordering::SeqCst);
    assert_eq!(service.delete(created.id).unwrap().id, created.id);
    assert_eq!(service.get(created.id), Err(ServiceError::NotFound(created.id)));
}

#[test]
fn test_concurrent_conflicting_creates_admit_only_one() {
    let store = Arc::new(Flaky::with_list_delay(Duration::from_millis(50)));
    let service = PolicyService::new(store.clone(), ServiceOptions::default()).unwrap();

    let results = thread::scope(|scope| {
        let allow = scope.spawn(|| service.create(policy("allow", Effect::Allow, 5)));
        let deny = scope.spawn(|| service.create(policy("deny", Effect::Deny, 5)));
        [allow.join().unwrap(), deny.join().unwrap()]
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(ServiceError::Conflict { .. })))
    );
    assert_eq!(store.all().unwrap().len(), 1);
}

// ============================================================================
// Listeners
// ============================================================================

#[test]
fn test_listener_failure_does_not_fail_write() {
    let service = service();
    service.subscribe(
        "broken",
        Arc::new(|_: &PolicyEvent| -> Result<(), ListenerError> { Err("downstream offline".into()) }),
    );
    service.subscribe(
        "panicky",
        Arc::new(|_: &PolicyEvent| -> Result<(), ListenerError> { panic!("listener bug") }),
    );

    let outcome = service.create(policy("p", Effect::Allow, 1)).unwrap();
    assert!(service.get(outcome.policy.id).is_ok());
}

// ============================================================================
// Bulk
// ============================================================================

#[test]
fn test_bulk_create_writes_all_and_publishes_once() {
    let service = service();
    let generation = service.publisher().current().generation();

    let policies: Vec<Policy> = (0..20)
        .map(|i| policy(&format!("p{i}"), Effect::Allow, i))
        .collect();
    let outcomes = service.bulk_create(policies).unwrap();

    assert_eq!(outcomes.len(), 20);
    assert_eq!(service.list(&PolicyFilter::new()).unwrap().len(), 20);
    let snapshot = service.publisher().current();
    assert_eq!(snapshot.generation(), generation + 1);
    assert_eq!(snapshot.len(), 20);
}

#[test]
fn test_bulk_create_stops_at_first_error() {
    let service = service_with(ServiceOptions {
        bulk_concurrency: 1,
        ..ServiceOptions::default()
    });
    let policies = vec![
        policy("first", Effect::Allow, 1),
        Policy::new("", Effect::Allow),
        policy("third", Effect::Allow, 3),
    ];

    let err = service.bulk_create(policies).unwrap_err();
    assert_eq!(err, ServiceError::Validation(ValidationError::EmptyName));

    let stored = service.list(&PolicyFilter::new()).unwrap();
    assert!(stored.iter().any(|p| p.name == "first"));
    assert!(!stored.iter().any(|p| p.name.is_empty()));
    // Earlier writes stay visible to decisions.
    assert_eq!(service.publisher().current().len(), stored.len());
}

#[test]
fn test_bulk_create_rejects_batch_that_conflicts_with_itself() {
    let service = service();
    let seen = recorder(&service);
    let allow = policy("allow", Effect::Allow, 1);
    let deny = policy("deny", Effect::Deny, 1);

    let err = service.bulk_create(vec![allow.clone(), deny]).unwrap_err();
    match err {
        ServiceError::Conflict { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].policy_id, allow.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(service.list(&PolicyFilter::new()).unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_bulk_workers_see_each_others_writes() {
    let store = Arc::new(Flaky::with_list_delay(Duration::from_millis(20)));
    let service = PolicyService::new(
        store.clone(),
        ServiceOptions {
            conflict_mode: ConflictMode::Warn,
            bulk_concurrency: 2,
        },
    )
    .unwrap();

    let outcomes = service
        .bulk_create(vec![
            policy("allow", Effect::Allow, 1),
            policy("deny", Effect::Deny, 1),
        ])
        .unwrap();

    // Whichever worker wrote second saw the first one's policy.
    assert_eq!(outcomes.iter().filter(|o| o.conflicts.len() == 1).count(), 1);
    assert_eq!(store.all().unwrap().len(), 2);
}

#[test]
fn test_bulk_update_reports_stale_versions() {
    let service = service();
    let a = service.create(policy("a", Effect::Allow, 1)).unwrap().policy;
    let b = service.create(policy("b", Effect::Allow, 2)).unwrap().policy;
    service.update(b.clone().with_priority(3), b.version).unwrap();

    let err = service
        .bulk_update(vec![
            (a.clone().with_priority(9), a.version),
            (b.clone().with_priority(9), b.version),
        ])
        .unwrap_err();
    assert!(matches!(err, ServiceError::VersionConflict { id, .. } if id == b.id));
}

#[test]
fn test_store_errors_are_mapped() {
    let id = PolicyId::from_u128(7);
    assert_eq!(ServiceError::from(StoreError::NotFound(id)), ServiceError::NotFound(id));
    assert_eq!(
        ServiceError::from(StoreError::Unavailable("down".into())),
        ServiceError::Store(StoreError::Unavailable("down".into()))
    );
    assert!(!ServiceError::from(StoreError::AlreadyExists(id)).is_retryable());
}

#[test]
fn test_options_from_config() {
    let mut config = EchoConfig::default();
    config.authoring.conflict_mode = ConflictMode::Warn;
    config.authoring.bulk_concurrency = 3;

    let options = ServiceOptions::from(&config);
    assert_eq!(options.conflict_mode, ConflictMode::Warn);
    assert_eq!(options.bulk_concurrency, 3);
}

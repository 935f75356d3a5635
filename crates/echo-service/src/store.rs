//! Policy persistence abstraction.
//!
//! The service talks to storage only through [`PolicyStore`]. Writes carry
//! the version the caller read, and the store refuses a write whose version
//! is stale, which is what makes concurrent updates safe without locks held
//! across the read-modify-write cycle.
//!
//! - **Production**: an adapter over whatever database holds the policies
//! - **Testing / CLI**: [`InMemoryPolicyStore`]

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use echo_abac::policy::{Effect, Policy};
use echo_types::{PolicyId, PolicyVersion};

// ============================================================================
// Store Trait
// ============================================================================

/// Storage for policies with optimistic concurrency.
pub trait PolicyStore: Send + Sync {
    /// Reads a policy by id.
    fn get(&self, id: PolicyId) -> Result<Option<Policy>, StoreError>;

    /// Lists policies matching `filter`, ordered by id, after applying
    /// `filter.offset` and `filter.limit`.
    fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError>;

    /// Writes a policy.
    ///
    /// # Arguments
    /// - `expected_version`: `None` to insert a new policy; `Some(v)` to
    ///   replace a stored policy currently at version `v`
    ///
    /// # Returns
    /// - `Ok(policy)` as stored
    /// - `Err(StoreError::VersionConflict)` if the stored version differs
    fn put(&self, policy: Policy, expected_version: Option<PolicyVersion>) -> Result<Policy, StoreError>;

    /// Removes a policy and returns the removed record.
    fn delete(&self, id: PolicyId) -> Result<Policy, StoreError>;

    /// Every stored policy.
    fn all(&self) -> Result<Vec<Policy>, StoreError> {
        self.list(&PolicyFilter::default())
    }
}

/// Errors from store operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("policy {0} not found")]
    NotFound(PolicyId),

    #[error("policy {0} already exists")]
    AlreadyExists(PolicyId),

    #[error("policy {id} was modified concurrently: expected {expected}, found {actual}")]
    VersionConflict {
        id: PolicyId,
        expected: PolicyVersion,
        actual: PolicyVersion,
    },

    #[error("policy store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Filter
// ============================================================================

/// Search criteria for [`PolicyStore::list`].
///
/// Unset criteria match everything. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFilter {
    /// Case-insensitive substring of the policy name.
    pub name_contains: Option<String>,
    pub effect: Option<Effect>,
    pub min_priority: Option<i64>,
    pub max_priority: Option<i64>,
    pub active: Option<bool>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl PolicyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_contains(mut self, fragment: &str) -> Self {
        self.name_contains = Some(fragment.to_string());
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn priority_between(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_priority = min;
        self.max_priority = max;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn updated_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.updated_from = from;
        self.updated_to = to;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether `policy` satisfies every criterion (pagination aside).
    pub fn matches(&self, policy: &Policy) -> bool {
        let name_ok = self.name_contains.as_ref().is_none_or(|fragment| {
            policy
                .name
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        });

        name_ok
            && self.effect.is_none_or(|e| policy.effect == e)
            && self.min_priority.is_none_or(|min| policy.priority >= min)
            && self.max_priority.is_none_or(|max| policy.priority <= max)
            && self.active.is_none_or(|a| policy.active == a)
            && self.updated_from.is_none_or(|from| policy.updated_at >= from)
            && self.updated_to.is_none_or(|to| policy.updated_at <= to)
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// A [`PolicyStore`] backed by a `BTreeMap` behind a `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<BTreeMap<PolicyId, Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store, bypassing version checks.
    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            policies: RwLock::new(policies.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get(&self, id: PolicyId) -> Result<Option<Policy>, StoreError> {
        let policies = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        Ok(policies.get(&id).cloned())
    }

    fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError> {
        let policies = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        Ok(policies
            .values()
            .filter(|p| filter.matches(p))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn put(&self, policy: Policy, expected_version: Option<PolicyVersion>) -> Result<Policy, StoreError> {
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);

        match (policies.get(&policy.id), expected_version) {
            (Some(_), None) => return Err(StoreError::AlreadyExists(policy.id)),
            (None, Some(_)) => return Err(StoreError::NotFound(policy.id)),
            (Some(stored), Some(expected)) if stored.version != expected => {
                return Err(StoreError::VersionConflict {
                    id: policy.id,
                    expected,
                    actual: stored.version,
                });
            }
            _ => {}
        }

        policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    fn delete(&self, id: PolicyId) -> Result<Policy, StoreError> {
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        policies.remove(&id).ok_or(StoreError::NotFound(id))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use echo_abac::policy::EntityMatcher;
    use test_case::test_case;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap()
    }

    fn policy(id: u128, name: &str, effect: Effect, priority: i64) -> Policy {
        Policy::new(name, effect)
            .with_id(PolicyId::from_u128(id))
            .with_subject(EntityMatcher::new("role"))
            .with_resource(EntityMatcher::new("api"))
            .with_action("read")
            .with_priority(priority)
            .with_updated_at(t0() + Duration::days(i64::try_from(id).unwrap()))
    }

    fn seeded() -> InMemoryPolicyStore {
        InMemoryPolicyStore::with_policies([
            policy(1, "Admin read", Effect::Allow, 1),
            policy(2, "Block contractors", Effect::Deny, 5),
            policy(3, "admin write", Effect::Allow, 10).with_active(false),
        ])
    }

    #[test]
    fn test_insert_then_get() {
        let store = InMemoryPolicyStore::new();
        let p = policy(1, "a", Effect::Allow, 1);
        store.put(p.clone(), None).unwrap();

        assert_eq!(store.get(p.id).unwrap(), Some(p.clone()));
        assert_eq!(store.put(p.clone(), None), Err(StoreError::AlreadyExists(p.id)));
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let store = seeded();
        let mut p = store.get(PolicyId::from_u128(1)).unwrap().unwrap();
        p.version = p.version.next();
        store.put(p.clone(), Some(PolicyVersion::INITIAL)).unwrap();

        let err = store.put(p, Some(PolicyVersion::INITIAL)).unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                id: PolicyId::from_u128(1),
                expected: PolicyVersion::INITIAL,
                actual: PolicyVersion::new(2),
            }
        );
    }

    #[test]
    fn test_update_of_missing_policy() {
        let store = InMemoryPolicyStore::new();
        let p = policy(9, "ghost", Effect::Deny, 0);
        assert_eq!(
            store.put(p, Some(PolicyVersion::INITIAL)),
            Err(StoreError::NotFound(PolicyId::from_u128(9)))
        );
    }

    #[test]
    fn test_delete() {
        let store = seeded();
        let removed = store.delete(PolicyId::from_u128(2)).unwrap();
        assert_eq!(removed.name, "Block contractors");
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.delete(PolicyId::from_u128(2)),
            Err(StoreError::NotFound(PolicyId::from_u128(2)))
        );
    }

    #[test_case(PolicyFilter::new(), &[1, 2, 3]; "no criteria")]
    #[test_case(PolicyFilter::new().name_contains("ADMIN"), &[1, 3]; "name case insensitive")]
    #[test_case(PolicyFilter::new().effect(Effect::Deny), &[2]; "effect")]
    #[test_case(PolicyFilter::new().priority_between(Some(2), Some(10)), &[2, 3]; "priority range")]
    #[test_case(PolicyFilter::new().active(true), &[1, 2]; "active only")]
    #[test_case(PolicyFilter::new().updated_between(Some(t0() + Duration::days(2)), None), &[2, 3]; "updated from")]
    #[test_case(PolicyFilter::new().limit(2), &[1, 2]; "limit")]
    #[test_case(PolicyFilter::new().offset(1).limit(1), &[2]; "offset and limit")]
    fn test_list_filters(filter: PolicyFilter, expected: &[u128]) {
        let ids: Vec<PolicyId> = seeded()
            .list(&filter)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        let expected: Vec<PolicyId> = expected.iter().copied().map(PolicyId::from_u128).collect();
        assert_eq!(ids, expected);
    }
}

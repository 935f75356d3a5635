//! Kani proofs for decision resolution
//!
//! These proofs verify the core guarantees of the decision resolver using
//! bounded model checking.
//!
//! **Proof Count**: 4 proofs (#1-4)
//!
//! Run with: `cargo kani --tests --harness verify_*`

#[cfg(kani)]
use crate::attributes::{AccessRequest, ResourceAttributes, SubjectAttributes};
#[cfg(kani)]
use crate::policy::{Effect, EntityMatcher, Policy};
#[cfg(kani)]
use crate::resolver::{self, Outcome};
#[cfg(kani)]
use chrono::{TimeZone, Utc};
#[cfg(kani)]
use echo_types::PolicyId;

#[cfg(kani)]
fn admin_request() -> AccessRequest {
    AccessRequest::new(
        SubjectAttributes::new("role").with_attribute("name", "admin"),
        ResourceAttributes::new("api"),
        "read",
    )
    .at(Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap())
}

#[cfg(kani)]
fn admin_policy(id: u128, effect: Effect, priority: i64) -> Policy {
    Policy::new("admin", effect)
        .with_id(PolicyId::from_u128(id))
        .with_subject(EntityMatcher::new("role").with_attribute("name", "admin"))
        .with_resource(EntityMatcher::new("api"))
        .with_action("read")
        .with_priority(priority)
}

/// Proof #1: Resolution determinism
///
/// **Property**: Same request and policy set always produce the same decision
///
/// **Verification**:
/// - Resolve a fixed request against a fixed set twice
/// - Outcome and deciding policy must be identical
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(10)]
fn verify_resolution_determinism() {
    let policies = vec![
        admin_policy(1, Effect::Allow, 3),
        admin_policy(2, Effect::Allow, 3),
    ];
    let request = admin_request();

    let first = resolver::resolve(&request, &policies);
    let second = resolver::resolve(&request, &policies);

    // Postcondition: Identical decisions
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.matched_policy_id, second.matched_policy_id);
}

/// Proof #2: Deny overrides
///
/// **Property**: A satisfied Deny wins regardless of Allow priority
///
/// **Verification**:
/// - Symbolic priorities for a Deny and an Allow that both match
/// - The outcome must be Deny, decided by the Deny policy
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(10)]
fn verify_deny_overrides() {
    let allow_priority: u8 = kani::any();
    let deny_priority: u8 = kani::any();

    let policies = vec![
        admin_policy(1, Effect::Allow, i64::from(allow_priority)),
        admin_policy(2, Effect::Deny, i64::from(deny_priority)),
    ];

    let decision = resolver::resolve(&admin_request(), &policies);

    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.matched_policy_id, Some(PolicyId::from_u128(2)));
}

/// Proof #3: Empty set is not applicable
///
/// **Property**: With no policies, the outcome is `NotApplicable`
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(10)]
fn verify_empty_set_not_applicable() {
    let decision = resolver::resolve(&admin_request(), &[]);

    assert_eq!(decision.outcome, Outcome::NotApplicable);
    assert!(decision.matched_policy_id.is_none());
}

/// Proof #4: Inactive policies never decide
///
/// **Property**: A policy with `active = false` never participates
///
/// **Verification**:
/// - A single inactive Deny that would otherwise match
/// - The outcome must be `NotApplicable`
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(10)]
fn verify_inactive_policy_never_decides() {
    let policies = vec![admin_policy(1, Effect::Deny, 1).with_active(false)];

    let decision = resolver::resolve(&admin_request(), &policies);

    assert_eq!(decision.outcome, Outcome::NotApplicable);
}

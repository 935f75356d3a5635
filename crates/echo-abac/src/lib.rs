//! # echo-abac: Attribute-Based Access Control decisions
//!
//! Turns a set of policies and an access request into a single
//! Permit / Deny / NotApplicable decision with a full trace.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Access Request                              │
//! │  (Subject + Resource + Action + Environment) │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Policy Matcher                              │
//! │  ├─ active + activation window               │
//! │  └─ subject / resource / action matchers     │
//! └─────────────────┬───────────────────────────┘
//!                   │ applicable policies
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Condition Evaluator                         │
//! │  ├─ AND / OR trees, short-circuiting         │
//! │  ├─ Operator registry                        │
//! │  └─ Dynamic attributes (provider + timeout)  │
//! └─────────────────┬───────────────────────────┘
//!                   │ satisfied policies
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Decision Resolver                           │
//! │  - Deny overrides Allow                      │
//! │  - priority, then updated_at, then id        │
//! │  - obligations, advice, trace                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! On the write side, [`conflict`] reports opposing policies with
//! overlapping scope, and [`version`] decides whether an update is a no-op.
//!
//! ## Examples
//!
//! ```
//! use echo_abac::attributes::{AccessRequest, ResourceAttributes, SubjectAttributes};
//! use echo_abac::condition::Condition;
//! use echo_abac::policy::{Effect, EntityMatcher, Policy};
//! use echo_abac::resolver::{self, Outcome};
//!
//! let allow = Policy::new("admins-read", Effect::Allow)
//!     .with_subject(EntityMatcher::new("role").with_attribute("name", "admin"))
//!     .with_resource(EntityMatcher::new("api"))
//!     .with_action("read")
//!     .with_priority(10);
//!
//! let deny = Policy::new("low-clearance", Effect::Deny)
//!     .with_subject(EntityMatcher::new("role"))
//!     .with_resource(EntityMatcher::new("api"))
//!     .with_action("read")
//!     .with_condition(Condition::new("subject.clearance", "lessThan", 2));
//!
//! let request = AccessRequest::new(
//!     SubjectAttributes::new("role")
//!         .with_attribute("name", "admin")
//!         .with_attribute("clearance", 4),
//!     ResourceAttributes::new("api"),
//!     "read",
//! );
//!
//! let decision = resolver::resolve(&request, &[allow, deny]);
//! assert_eq!(decision.outcome, Outcome::Permit);
//! ```

pub mod attributes;
pub mod condition;
pub mod conflict;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod operators;
pub mod policy;
pub mod providers;
pub mod resolver;
pub mod snapshot;
pub mod version;

// Kani proofs for bounded model checking
#[cfg(any(test, kani))]
mod kani_proofs;

pub use attributes::{
    AccessRequest, AttributeValue, EnvironmentAttributes, ResourceAttributes, SubjectAttributes,
};
pub use condition::{Condition, ConditionSet, LogicalOperator};
pub use conflict::{Conflict, detect_conflicts, find_conflicts};
pub use error::{EvaluationError, ProviderError, ValidationError};
pub use evaluator::{ConditionStatus, ConditionTrace, EvaluationContext, LookupLimiter, evaluate};
pub use matcher::{Applicability, applicability, matches};
pub use operators::OperatorRegistry;
pub use policy::{Effect, EntityMatcher, Obligation, Policy};
pub use providers::{AttributeProvider, ClockAttributeProvider, ProviderChain, StaticAttributeProvider};
pub use resolver::{Decision, DecisionResolver, Outcome, TraceEntry, TraceStage, resolve};
pub use snapshot::{PolicySnapshot, SnapshotPublisher};
pub use version::{PreparedUpdate, prepare_update};

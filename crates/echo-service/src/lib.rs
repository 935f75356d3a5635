//! # echo-service: policy administration and decisions
//!
//! Wraps the pure decision engine in `echo-abac` with the stateful parts of
//! a policy decision point:
//!
//! - [`PolicyService`]: validated, conflict-checked, versioned writes
//! - [`PolicyStore`]: storage seam with optimistic concurrency
//! - [`EventDispatcher`]: isolated change listeners
//! - [`PolicyDecisionPoint`]: decisions against the published snapshot
//!
//! ```text
//!  writers ──▶ PolicyService ──▶ PolicyStore
//!                   │
//!                   ├──▶ SnapshotPublisher ◀── PolicyDecisionPoint ◀── requests
//!                   │
//!                   └──▶ EventDispatcher ──▶ listeners
//! ```
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use echo_abac::attributes::{AccessRequest, ResourceAttributes, SubjectAttributes};
//! use echo_abac::policy::{Effect, EntityMatcher, Policy};
//! use echo_abac::resolver::{DecisionResolver, Outcome};
//! use echo_service::{InMemoryPolicyStore, PolicyDecisionPoint, PolicyService, ServiceOptions};
//!
//! let service = PolicyService::new(Arc::new(InMemoryPolicyStore::new()), ServiceOptions::default())?;
//! service.create(
//!     Policy::new("engineers-read", Effect::Allow)
//!         .with_subject(EntityMatcher::new("user").with_attribute("department", "engineering"))
//!         .with_resource(EntityMatcher::new("document"))
//!         .with_action("read"),
//! )?;
//!
//! let pdp = PolicyDecisionPoint::new(service.publisher(), DecisionResolver::new());
//! let request = AccessRequest::new(
//!     SubjectAttributes::new("user").with_attribute("department", "engineering"),
//!     ResourceAttributes::new("document"),
//!     "read",
//! );
//! assert_eq!(pdp.decide(&request).outcome, Outcome::Permit);
//! # Ok::<(), echo_service::ServiceError>(())
//! ```

pub mod error;
pub mod events;
pub mod pdp;
pub mod service;
pub mod store;

pub use error::ServiceError;
pub use events::{DispatchReport, EventDispatcher, ListenerError, PolicyEvent, PolicyListener};
pub use pdp::PolicyDecisionPoint;
pub use service::{PolicyService, PolicyUsage, ServiceOptions, WriteOutcome};
pub use store::{InMemoryPolicyStore, PolicyFilter, PolicyStore, StoreError};

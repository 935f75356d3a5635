//! Policy decision point.
//!
//! Reads the current snapshot once per request, so a decision is always made
//! against a single consistent policy set even while writers publish new
//! generations.

use std::sync::Arc;

use echo_abac::attributes::AccessRequest;
use echo_abac::providers::AttributeProvider;
use echo_abac::resolver::{Decision, DecisionResolver};
use echo_abac::snapshot::SnapshotPublisher;
use echo_config::EchoConfig;

#[derive(Debug, Clone)]
pub struct PolicyDecisionPoint {
    publisher: Arc<SnapshotPublisher>,
    resolver: DecisionResolver,
}

impl PolicyDecisionPoint {
    pub fn new(publisher: Arc<SnapshotPublisher>, resolver: DecisionResolver) -> Self {
        Self { publisher, resolver }
    }

    /// Decision point using the configured attribute timeout.
    pub fn from_config(
        publisher: Arc<SnapshotPublisher>,
        config: &EchoConfig,
        provider: Option<Arc<dyn AttributeProvider>>,
    ) -> Self {
        let mut resolver = DecisionResolver::new().with_timeout(config.engine.attribute_timeout());
        if let Some(provider) = provider {
            resolver = resolver.with_provider(provider);
        }
        Self::new(publisher, resolver)
    }

    pub fn decide(&self, request: &AccessRequest) -> Decision {
        let snapshot = self.publisher.current();
        let decision = self.resolver.resolve(request, snapshot.policies());
        tracing::debug!(
            generation = snapshot.generation(),
            subject = request.subject.id.as_deref().unwrap_or("-"),
            action = %request.action,
            outcome = ?decision.outcome,
            "access decided"
        );
        decision
    }

    /// Generation of the snapshot the next decision will read.
    pub fn snapshot_generation(&self) -> u64 {
        self.publisher.current().generation()
    }
}

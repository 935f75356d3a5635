//! Policy change notifications.
//!
//! Listeners observe successful writes: cache invalidation, audit logging,
//! notification fan-out. Delivery is best effort. Each listener runs in
//! isolation; an error or a panic in one is logged and never reaches the
//! other listeners or the writer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use echo_abac::policy::Policy;
use serde::Serialize;

/// A committed policy change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PolicyEvent {
    Created { policy: Policy },
    Updated { old: Policy, new: Policy },
    Deleted { policy: Policy },
}

impl PolicyEvent {
    /// Topic name: `policy.created`, `policy.updated`, or `policy.deleted`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "policy.created",
            Self::Updated { .. } => "policy.updated",
            Self::Deleted { .. } => "policy.deleted",
        }
    }

    /// The policy as it stands after the change (or as it was, for deletes).
    pub fn policy(&self) -> &Policy {
        match self {
            Self::Created { policy } | Self::Deleted { policy } => policy,
            Self::Updated { new, .. } => new,
        }
    }
}

/// Error type listeners report failures with.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives policy change events.
pub trait PolicyListener: Send + Sync {
    fn on_event(&self, event: &PolicyEvent) -> Result<(), ListenerError>;
}

impl<F> PolicyListener for F
where
    F: Fn(&PolicyEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &PolicyEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Outcome of delivering one event to every listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Names of the listeners that failed or panicked.
    pub failed: Vec<String>,
}

/// Registry of named listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<(String, Arc<dyn PolicyListener>)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, name: &str, listener: Arc<dyn PolicyListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), listener));
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener in subscription order.
    pub fn dispatch(&self, event: &PolicyEvent) -> DispatchReport {
        // Snapshot the list so listeners may subscribe others without deadlocking.
        let listeners: Vec<(String, Arc<dyn PolicyListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut report = DispatchReport::default();
        for (name, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    tracing::warn!(
                        listener = %name,
                        event = event.name(),
                        policy_id = %event.policy().id,
                        error = %error,
                        "policy listener failed"
                    );
                    report.failed.push(name);
                }
                Err(_) => {
                    tracing::warn!(
                        listener = %name,
                        event = event.name(),
                        policy_id = %event.policy().id,
                        "policy listener panicked"
                    );
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &names)
            .finish()
    }
}

//! Policy definitions.
//!
//! A [`Policy`] grants or denies a set of actions to the subjects and
//! resources its matchers describe, gated by an implicitly AND-ed list of
//! [`Condition`] trees. Policies are plain data: matching lives in
//! [`matcher`](crate::matcher), evaluation in [`resolver`](crate::resolver).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use echo_types::{PolicyId, PolicyVersion};
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeMap, AttributeValue, EntityAttributes};
use crate::condition::Condition;
use crate::error::ValidationError;

// ============================================================================
// Effect
// ============================================================================

/// The effect of a policy: allow or deny access.
///
/// Serialized as `"allow"` / `"deny"`. Any other string is rejected with
/// [`ValidationError::UnrecognizedEffect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Effect {
    /// Grant access.
    Allow,
    /// Deny access.
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Allow => Self::Deny,
            Self::Deny => Self::Allow,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(ValidationError::UnrecognizedEffect(other.to_string())),
        }
    }
}

impl TryFrom<String> for Effect {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Entity Matcher
// ============================================================================

/// Declares which subjects (or resources) a policy applies to.
///
/// Matches an entity whose type equals `type`, whose id equals `id` when one
/// is declared, and whose attributes equal every declared attribute.
/// Undeclared attribute keys are wildcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatcher {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl EntityMatcher {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Whether `entity` satisfies this matcher.
    pub fn matches(&self, entity: &EntityAttributes) -> bool {
        if self.kind != entity.kind {
            return false;
        }
        if let Some(id) = &self.id
            && entity.id.as_ref() != Some(id)
        {
            return false;
        }
        self.attributes.iter().all(|(key, expected)| {
            entity
                .attributes
                .get(key)
                .is_some_and(|actual| actual.equivalent(expected))
        })
    }

    /// Whether some entity could satisfy both matchers.
    ///
    /// Requires the same type, no contradicting ids, and equal values for
    /// every attribute key both matchers declare.
    pub fn overlaps(&self, other: &EntityMatcher) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.id, &other.id)
            && a != b
        {
            return false;
        }
        self.attributes.iter().all(|(key, value)| {
            other
                .attributes
                .get(key)
                .is_none_or(|theirs| theirs.equivalent(value))
        })
    }
}

// ============================================================================
// Obligation
// ============================================================================

/// An action the enforcement point must carry out alongside the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

impl Obligation {
    pub fn new(kind: &str, action: &str) -> Self {
        Self {
            kind: kind.to_string(),
            action: action.to_string(),
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

// ============================================================================
// Policy
// ============================================================================

/// An access-control policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "PolicyId::generate")]
    pub id: PolicyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub effect: Effect,
    #[serde(default)]
    pub subjects: Vec<EntityMatcher>,
    #[serde(default)]
    pub resources: Vec<EntityMatcher>,
    #[serde(default)]
    pub actions: BTreeSet<String>,
    /// Implicitly AND-ed.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Higher wins ties during resolution. Must be non-negative.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub version: PolicyVersion,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub advice: BTreeMap<String, String>,
    /// Policy this one was derived from. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_policy_id: Option<PolicyId>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Policy {
    /// Creates an active version-1 policy with a fresh id and no matchers.
    pub fn new(name: &str, effect: Effect) -> Self {
        let now = Utc::now();
        Self {
            id: PolicyId::generate(),
            name: name.to_string(),
            description: String::new(),
            effect,
            subjects: Vec::new(),
            resources: Vec::new(),
            actions: BTreeSet::new(),
            conditions: Vec::new(),
            priority: 0,
            version: PolicyVersion::INITIAL,
            active: true,
            activation_date: None,
            deactivation_date: None,
            obligations: Vec::new(),
            advice: BTreeMap::new(),
            parent_policy_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: PolicyId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_subject(mut self, subject: EntityMatcher) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_resource(mut self, resource: EntityMatcher) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.actions.insert(action.to_string());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Restricts the policy to `[from, until]`; either bound may be open.
    pub fn with_activation_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.activation_date = from;
        self.deactivation_date = until;
        self
    }

    pub fn with_obligation(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn with_advice(mut self, key: &str, value: &str) -> Self {
        self.advice.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_parent(mut self, parent: PolicyId) -> Self {
        self.parent_policy_id = Some(parent);
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    /// Whether the activation window contains `at`. Bounds are inclusive.
    pub fn window_contains(&self, at: DateTime<Utc>) -> bool {
        self.activation_date.is_none_or(|from| from <= at)
            && self.deactivation_date.is_none_or(|until| at <= until)
    }

    /// Whether the policy takes part in matching at `at`: active and inside
    /// its activation window.
    pub fn is_in_effect(&self, at: DateTime<Utc>) -> bool {
        self.active && self.window_contains(at)
    }

    /// Checks structural validity.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking name, priority,
    /// subjects, resources, actions, matcher types, then the activation window.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.priority < 0 {
            return Err(ValidationError::NegativePriority(self.priority));
        }
        if self.subjects.is_empty() {
            return Err(ValidationError::NoSubjects);
        }
        if self.resources.is_empty() {
            return Err(ValidationError::NoResources);
        }
        if self.actions.is_empty() || self.actions.iter().all(|a| a.trim().is_empty()) {
            return Err(ValidationError::NoActions);
        }
        if self.subjects.iter().any(|s| s.kind.trim().is_empty()) {
            return Err(ValidationError::EmptyMatcherType("subject"));
        }
        if self.resources.iter().any(|r| r.kind.trim().is_empty()) {
            return Err(ValidationError::EmptyMatcherType("resource"));
        }
        if let (Some(from), Some(until)) = (self.activation_date, self.deactivation_date)
            && until <= from
        {
            return Err(ValidationError::InvertedActivationWindow);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

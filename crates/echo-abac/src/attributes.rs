//! Attribute types for ABAC evaluation.
//!
//! Three attribute categories drive access decisions:
//! - **Subject attributes**: who is asking (user, role, group) and their properties
//! - **Resource attributes**: what is being accessed (file, api, database)
//! - **Environment attributes**: request context such as source address or device
//!
//! Conditions reference attributes by name. Qualified names (`subject.department`,
//! `resource.owner`, `environment.ip`) address one category; unqualified names are
//! looked up in subject, resource, then environment attributes.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Value
// ============================================================================

/// A dynamically typed attribute value.
///
/// Serialized untagged, so JSON literals map directly: `3` is an integer,
/// `3.5` a float, `"admin"` a string and `["a", "b"]` a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Absent or explicitly null value.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Short type name used in evaluation error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }

    /// Coerces the value to a number.
    ///
    /// Integers, floats, and strings that parse as a number are coercible;
    /// everything else is not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Exact-match equality used by matchers and the `equals` operator.
    ///
    /// Integers and floats compare numerically; lists compare element-wise;
    /// values of different kinds are never equal.
    pub fn equivalent(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            _ => self == other,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Attribute name to value mapping. Ordered so that traces and
/// serialized requests are deterministic.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

// ============================================================================
// Subject / Resource Attributes
// ============================================================================

/// Attributes describing one party of the request: the subject asking for
/// access, or the resource being accessed.
///
/// These are typically populated from the identity provider and the
/// resource catalog at the start of each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    /// Identifier of the entity (user id, resource id), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Entity type (e.g., "user", "role", "group" or "file", "api", "database").
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form attributes of the entity.
    #[serde(default)]
    pub attributes: AttributeMap,
}

/// Attributes of the subject making the request.
pub type SubjectAttributes = EntityAttributes;

/// Attributes of the resource being accessed.
pub type ResourceAttributes = EntityAttributes;

impl EntityAttributes {
    /// Creates attributes for an entity of the given type with no id and no attributes.
    pub fn new(kind: &str) -> Self {
        Self {
            id: None,
            kind: kind.to_string(),
            attributes: AttributeMap::new(),
        }
    }

    /// Sets the entity id.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Adds or replaces an attribute.
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Resolves a key relative to this entity.
    ///
    /// `id` and `type` address the entity's own fields; any other key is an
    /// attribute lookup.
    pub fn lookup(&self, key: &str) -> Option<AttributeValue> {
        match key {
            "type" => Some(AttributeValue::String(self.kind.clone())),
            "id" => self
                .id
                .clone()
                .map(AttributeValue::String)
                .or_else(|| self.attributes.get(key).cloned()),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

// ============================================================================
// Environment Attributes
// ============================================================================

/// Attributes describing the environment/context of the access request.
///
/// These are supplied by the enforcement point rather than the subject
/// (source address, device, channel). Clock-derived values come from
/// [`AccessRequest::timestamp`] via the clock attribute provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentAttributes {
    pub attributes: AttributeMap,
}

impl EnvironmentAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an environment attribute.
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Whether `ts` falls within business hours: 09:00-17:00 UTC on weekdays (Mon-Fri).
///
/// This is a simplification; deployments needing per-tenant time zones should
/// register their own attribute provider.
pub fn is_business_hours(ts: DateTime<Utc>) -> bool {
    let hour = ts.hour();
    let is_weekday = matches!(
        ts.weekday(),
        chrono::Weekday::Mon
            | chrono::Weekday::Tue
            | chrono::Weekday::Wed
            | chrono::Weekday::Thu
            | chrono::Weekday::Fri
    );
    is_weekday && (9..17).contains(&hour)
}

// ============================================================================
// Access Request
// ============================================================================

/// An access request submitted to the decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub subject: SubjectAttributes,
    pub resource: ResourceAttributes,
    /// The action being attempted (e.g., "read", "write").
    pub action: String,
    #[serde(default)]
    pub environment: EnvironmentAttributes,
    /// Instant the request is evaluated at. Activation windows and
    /// clock-derived attributes are computed against this value, which keeps
    /// repeated evaluations of the same request identical.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AccessRequest {
    /// Creates a request stamped with the current time and no environment attributes.
    pub fn new(subject: SubjectAttributes, resource: ResourceAttributes, action: &str) -> Self {
        Self {
            subject,
            resource,
            action: action.to_string(),
            environment: EnvironmentAttributes::default(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the evaluation instant.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds an environment attribute.
    pub fn with_environment(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.environment = self.environment.with_attribute(name, value);
        self
    }

    /// Resolves an attribute reference against the request.
    ///
    /// Supported forms: `action`, `subject.<key>`, `resource.<key>`,
    /// `environment.<key>` (or `env.<key>`), and unqualified names, which are
    /// searched in subject, resource, then environment attributes.
    pub fn lookup(&self, reference: &str) -> Option<AttributeValue> {
        if reference == "action" {
            return Some(AttributeValue::String(self.action.clone()));
        }

        if let Some((scope, key)) = reference.split_once('.') {
            match scope {
                "subject" => return self.subject.lookup(key),
                "resource" => return self.resource.lookup(key),
                "environment" | "env" => return self.environment.get(key).cloned(),
                _ => {}
            }
        }

        self.subject
            .attributes
            .get(reference)
            .or_else(|| self.resource.attributes.get(reference))
            .or_else(|| self.environment.get(reference))
            .cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================

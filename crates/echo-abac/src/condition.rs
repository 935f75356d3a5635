//! Condition trees.
//!
//! A [`Condition`] is either a leaf comparison (`attribute <operator> value`)
//! or a group that delegates entirely to a nested [`ConditionSet`]. Sets
//! combine their children with `AND` or `OR` and may nest arbitrarily deep.
//!
//! Operators are referenced by name and looked up in an
//! [`OperatorRegistry`](crate::operators::OperatorRegistry) at evaluation
//! time, so adding an operator never changes the tree.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeValue;

/// Boolean combinator of a [`ConditionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// All children must hold. Short-circuits on the first `false`.
    #[serde(rename = "AND", alias = "and")]
    And,
    /// At least one child must hold. Short-circuits on the first `true`.
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// A single condition node.
///
/// When `sub_conditions` is set the node is evaluated solely by recursing
/// into the set; `attribute`, `operator`, and `value` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute reference (see [`AccessRequest::lookup`](crate::attributes::AccessRequest::lookup)).
    #[serde(default)]
    pub attribute: String,
    /// Operator name, e.g. `equals` or `greaterThan`.
    #[serde(default)]
    pub operator: String,
    /// Right-hand operand.
    #[serde(default)]
    pub value: AttributeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_conditions: Option<ConditionSet>,
    /// Resolve `attribute` through the attribute provider instead of the request.
    #[serde(default)]
    pub is_dynamic: bool,
}

impl Condition {
    /// Creates a leaf comparison against a request attribute.
    pub fn new(attribute: &str, operator: &str, value: impl Into<AttributeValue>) -> Self {
        Self {
            attribute: attribute.to_string(),
            operator: operator.to_string(),
            value: value.into(),
            sub_conditions: None,
            is_dynamic: false,
        }
    }

    /// Creates a leaf comparison against a dynamically resolved attribute.
    pub fn dynamic(attribute: &str, operator: &str, value: impl Into<AttributeValue>) -> Self {
        Self {
            is_dynamic: true,
            ..Self::new(attribute, operator, value)
        }
    }

    /// Creates a group node delegating to `set`.
    pub fn group(set: ConditionSet) -> Self {
        Self {
            attribute: String::new(),
            operator: String::new(),
            value: AttributeValue::Null,
            sub_conditions: Some(set),
            is_dynamic: false,
        }
    }

    /// Group node requiring every child to hold.
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::group(ConditionSet::and(conditions))
    }

    /// Group node requiring at least one child to hold.
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::group(ConditionSet::or(conditions))
    }

    pub fn is_group(&self) -> bool {
        self.sub_conditions.is_some()
    }

    /// Number of leaf comparisons in this subtree.
    pub fn leaf_count(&self) -> usize {
        match &self.sub_conditions {
            Some(set) => set.conditions.iter().map(Condition::leaf_count).sum(),
            None => 1,
        }
    }
}

/// A boolean combination of nested conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            operator: LogicalOperator::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            operator: LogicalOperator::Or,
            conditions,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

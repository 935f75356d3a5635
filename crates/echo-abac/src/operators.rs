//! Comparison operator registry.
//!
//! Every leaf condition names an operator. The registry maps that name to a
//! pure comparison function over `(request value, condition value)`. A
//! comparator returns `None` when its operands are not comparable, which the
//! evaluator reports as a type mismatch and fails closed.
//!
//! New operators are registered without touching the evaluator:
//!
//! ```
//! use echo_abac::attributes::AttributeValue;
//! use echo_abac::operators::OperatorRegistry;
//!
//! let registry = OperatorRegistry::standard().with_operator("isEven", |left, _right| {
//!     left.as_number().map(|n| n % 2.0 == 0.0)
//! });
//!
//! let result = registry.apply("isEven", &AttributeValue::Integer(4), &AttributeValue::Null);
//! assert_eq!(result, Ok(true));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::attributes::AttributeValue;
use crate::error::EvaluationError;

pub const EQUALS: &str = "equals";
pub const NOT_EQUALS: &str = "notEquals";
pub const CONTAINS: &str = "contains";
pub const NOT_CONTAINS: &str = "notContains";
pub const IN: &str = "in";
pub const NOT_IN: &str = "notIn";
pub const GREATER_THAN: &str = "greaterThan";
pub const GREATER_THAN_OR_EQUALS: &str = "greaterThanOrEquals";
pub const LESS_THAN: &str = "lessThan";
pub const LESS_THAN_OR_EQUALS: &str = "lessThanOrEquals";
pub const STARTS_WITH: &str = "startsWith";
pub const ENDS_WITH: &str = "endsWith";
pub const MATCHES: &str = "matches";
pub const BETWEEN: &str = "between";

/// A comparison function: `Some(result)` when the operands are comparable,
/// `None` otherwise.
pub type Comparator = dyn Fn(&AttributeValue, &AttributeValue) -> Option<bool> + Send + Sync;

/// Maps operator names to comparison functions.
///
/// Cloning is cheap: comparators are shared behind `Arc`.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<Comparator>>,
}

impl OperatorRegistry {
    /// Creates a registry with no operators.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Creates a registry with the standard operator set.
    pub fn standard() -> Self {
        Self::empty()
            .with_operator(EQUALS, |l, r| Some(l.equivalent(r)))
            .with_operator(NOT_EQUALS, |l, r| Some(!l.equivalent(r)))
            .with_operator(CONTAINS, contains)
            .with_operator(NOT_CONTAINS, |l, r| contains(l, r).map(|b| !b))
            .with_operator(IN, is_in)
            .with_operator(NOT_IN, |l, r| is_in(l, r).map(|b| !b))
            .with_operator(GREATER_THAN, |l, r| numeric(l, r, |a, b| a > b))
            .with_operator(GREATER_THAN_OR_EQUALS, |l, r| numeric(l, r, |a, b| a >= b))
            .with_operator(LESS_THAN, |l, r| numeric(l, r, |a, b| a < b))
            .with_operator(LESS_THAN_OR_EQUALS, |l, r| numeric(l, r, |a, b| a <= b))
            .with_operator(STARTS_WITH, |l, r| {
                Some(l.as_str()?.starts_with(r.as_str()?))
            })
            .with_operator(ENDS_WITH, |l, r| Some(l.as_str()?.ends_with(r.as_str()?)))
            .with_operator(MATCHES, |l, r| Some(glob_matches(r.as_str()?, l.as_str()?)))
            .with_operator(BETWEEN, between)
    }

    /// Registers (or replaces) an operator (builder pattern).
    pub fn with_operator<F>(mut self, name: &str, comparator: F) -> Self
    where
        F: Fn(&AttributeValue, &AttributeValue) -> Option<bool> + Send + Sync + 'static,
    {
        self.register(name, comparator);
        self
    }

    /// Registers (or replaces) an operator in place.
    pub fn register<F>(&mut self, name: &str, comparator: F)
    where
        F: Fn(&AttributeValue, &AttributeValue) -> Option<bool> + Send + Sync + 'static,
    {
        self.operators.insert(name.to_string(), Arc::new(comparator));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Applies operator `name` to `(left, right)`.
    ///
    /// # Errors
    ///
    /// * [`EvaluationError::UnknownOperator`] - `name` is not registered
    /// * [`EvaluationError::TypeMismatch`] - the operands are not comparable
    pub fn apply(
        &self,
        name: &str,
        left: &AttributeValue,
        right: &AttributeValue,
    ) -> Result<bool, EvaluationError> {
        let comparator = self
            .operators
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownOperator {
                operator: name.to_string(),
            })?;

        comparator(left, right)
            .ok_or_else(|| EvaluationError::type_mismatch(name, left.kind(), right.kind()))
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.names())
            .finish()
    }
}

// ============================================================================
// Standard Comparators
// ============================================================================

/// `left contains right`: list membership or substring.
///
/// Empty lists and empty strings never contain anything.
fn contains(left: &AttributeValue, right: &AttributeValue) -> Option<bool> {
    match left {
        AttributeValue::List(items) => Some(items.iter().any(|item| item.equivalent(right))),
        AttributeValue::String(haystack) => {
            let needle = right.as_str()?;
            Some(!haystack.is_empty() && haystack.contains(needle))
        }
        _ => None,
    }
}

/// `left in right`: membership of `left` in the list `right`, or substring
/// of the string `right`.
///
/// A list on the left matches when any of its elements is in `right`.
fn is_in(left: &AttributeValue, right: &AttributeValue) -> Option<bool> {
    match right {
        AttributeValue::List(candidates) => Some(match left {
            AttributeValue::List(values) => values
                .iter()
                .any(|value| candidates.iter().any(|c| c.equivalent(value))),
            value => candidates.iter().any(|c| c.equivalent(value)),
        }),
        AttributeValue::String(haystack) => {
            let needle = left.as_str()?;
            Some(!haystack.is_empty() && haystack.contains(needle))
        }
        _ => None,
    }
}

fn numeric(
    left: &AttributeValue,
    right: &AttributeValue,
    cmp: impl Fn(f64, f64) -> bool,
) -> Option<bool> {
    Some(cmp(left.as_number()?, right.as_number()?))
}

/// `left between [low, high]`, inclusive.
///
/// Bounds are either both numeric or both RFC 3339 timestamps.
fn between(left: &AttributeValue, right: &AttributeValue) -> Option<bool> {
    let [low, high] = right.as_list()? else {
        return None;
    };

    if let (Some(value), Some(lo), Some(hi)) = (left.as_number(), low.as_number(), high.as_number())
    {
        return Some(lo <= value && value <= hi);
    }

    let value = parse_timestamp(left)?;
    let lo = parse_timestamp(low)?;
    let hi = parse_timestamp(high)?;
    Some(lo <= value && value <= hi)
}

fn parse_timestamp(value: &AttributeValue) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// Iterative with single-star backtracking: O(pattern * value) in the worst
/// case and constant stack, so request values of any length are safe.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    let (pattern, value) = (pattern.as_bytes(), value.as_bytes());
    let (mut p, mut v) = (0, 0);
    // Position of the last `*` seen and the value index it is anchored at.
    let mut star: Option<(usize, usize)> = None;

    while v < value.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, v));
                p += 1;
            }
            Some(&c) if c == b'?' || c == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match star {
                // Let the last `*` swallow one more character and retry.
                Some((star_p, anchor)) => {
                    star = Some((star_p, anchor + 1));
                    p = star_p + 1;
                    v = anchor + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(json: &str) -> AttributeValue {
        serde_json::from_str(json).expect("valid attribute json")
    }

    #[test_case(EQUALS, "\"admin\"", "\"admin\"", true; "equals strings")]
    #[test_case(EQUALS, "3", "3.0", true; "equals int float")]
    #[test_case(EQUALS, "\"3\"", "3", false; "equals string vs int")]
    #[test_case(NOT_EQUALS, "\"a\"", "\"b\"", true; "not equals")]
    #[test_case(CONTAINS, "[\"a\", \"b\"]", "\"b\"", true; "contains list")]
    #[test_case(CONTAINS, "[]", "\"b\"", false; "contains empty list")]
    #[test_case(CONTAINS, "\"engineering\"", "\"gine\"", true; "contains substring")]
    #[test_case(CONTAINS, "\"\"", "\"\"", false; "contains empty string")]
    #[test_case(NOT_CONTAINS, "[\"a\"]", "\"b\"", true; "not contains")]
    #[test_case(IN, "\"b\"", "[\"a\", \"b\"]", true; "in list")]
    #[test_case(IN, "\"b\"", "[]", false; "in empty list")]
    #[test_case(IN, "[\"x\", \"b\"]", "[\"a\", \"b\"]", true; "in list intersection")]
    #[test_case(IN, "\"ops\"", "\"devops\"", true; "in substring")]
    #[test_case(NOT_IN, "\"c\"", "[\"a\", \"b\"]", true; "not in")]
    #[test_case(GREATER_THAN, "4", "3", true; "gt")]
    #[test_case(GREATER_THAN, "3", "3", false; "gt equal")]
    #[test_case(GREATER_THAN, "\"10\"", "9.5", true; "gt numeric string")]
    #[test_case(GREATER_THAN_OR_EQUALS, "3", "3", true; "gte")]
    #[test_case(LESS_THAN, "2.5", "3", true; "lt")]
    #[test_case(LESS_THAN_OR_EQUALS, "3", "3", true; "lte")]
    #[test_case(STARTS_WITH, "\"patient_records\"", "\"patient_\"", true; "starts with")]
    #[test_case(ENDS_WITH, "\"report.pdf\"", "\".pdf\"", true; "ends with")]
    #[test_case(MATCHES, "\"patient_records\"", "\"patient_*\"", true; "glob match")]
    #[test_case(MATCHES, "\"metrics\"", "\"patient_*\"", false; "glob no match")]
    #[test_case(BETWEEN, "5", "[1, 10]", true; "between numeric")]
    #[test_case(BETWEEN, "10", "[1, 10]", true; "between inclusive")]
    #[test_case(BETWEEN, "11", "[1, 10]", false; "between outside")]
    #[test_case(
        BETWEEN,
        "\"2025-01-08T10:00:00Z\"",
        "[\"2025-01-08T09:00:00Z\", \"2025-01-08T17:00:00Z\"]",
        true;
        "between timestamps"
    )]
    fn standard_operator_table(operator: &str, left: &str, right: &str, expected: bool) {
        let registry = OperatorRegistry::standard();
        assert_eq!(registry.apply(operator, &v(left), &v(right)), Ok(expected));
    }

    #[test_case(GREATER_THAN, "\"high\"", "3"; "gt non numeric string")]
    #[test_case(LESS_THAN, "true", "3"; "lt bool")]
    #[test_case(CONTAINS, "5", "5"; "contains scalar")]
    #[test_case(IN, "\"a\"", "5"; "in scalar")]
    #[test_case(STARTS_WITH, "5", "\"5\""; "starts with number")]
    #[test_case(BETWEEN, "5", "[1]"; "between one bound")]
    #[test_case(BETWEEN, "\"noon\"", "[1, 2]"; "between mixed")]
    fn incomparable_operands_are_type_mismatches(operator: &str, left: &str, right: &str) {
        let registry = OperatorRegistry::standard();
        let err = registry.apply(operator, &v(left), &v(right)).unwrap_err();
        assert!(
            matches!(err, EvaluationError::TypeMismatch { .. }),
            "expected type mismatch, got {err:?}"
        );
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::standard();
        let err = registry
            .apply("approximately", &v("1"), &v("1"))
            .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::UnknownOperator {
                operator: "approximately".to_string()
            }
        );
    }

    #[test]
    fn test_custom_operator_registration() {
        let registry = OperatorRegistry::empty().with_operator("lengthAtLeast", |l, r| {
            let min = r.as_number()?;
            Some(l.as_str()?.len() as f64 >= min)
        });

        assert!(registry.contains("lengthAtLeast"));
        assert!(!registry.contains(EQUALS));
        assert_eq!(registry.apply("lengthAtLeast", &v("\"abcd\""), &v("3")), Ok(true));
    }

    #[test]
    fn test_standard_names_are_sorted() {
        let registry = OperatorRegistry::standard();
        let names = registry.names();
        assert_eq!(names.len(), 14);
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_glob_matches_star() {
        assert!(glob_matches("*", "anything"));
        assert!(glob_matches("*", ""));
        assert!(glob_matches("foo*", "foobar"));
        assert!(glob_matches("foo*", "foo"));
        assert!(!glob_matches("foo*", "bar"));
        assert!(glob_matches("*bar", "foobar"));
        assert!(glob_matches("f*r", "foobar"));
    }

    #[test]
    fn test_glob_matches_question() {
        assert!(glob_matches("fo?", "foo"));
        assert!(!glob_matches("fo?", "fo"));
        assert!(!glob_matches("fo?", "fooo"));
        assert!(glob_matches("?oo", "foo"));
    }

    #[test]
    fn test_glob_matches_long_value() {
        let mut value = "a".repeat(2_000_000);
        value.push('b');
        assert!(glob_matches("*b", &value));
        assert!(!glob_matches("*c", &value));
        assert!(glob_matches("a*a?", &value));
    }

    #[test]
    fn test_glob_matches_many_stars_without_blowup() {
        let pattern = "*a*a*a*a*a*a*a*a*a*a*b";
        let value = "a".repeat(30);
        let started = std::time::Instant::now();
        assert!(!glob_matches(pattern, &value));
        assert!(glob_matches(pattern, &format!("{value}b")));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_glob_matches_backtracks_past_partial_match() {
        assert!(glob_matches("*ab", "aab"));
        assert!(glob_matches("a*b*c", "axxbyybzc"));
        assert!(!glob_matches("a*b*c", "axxbyyb"));
        assert!(glob_matches("**", ""));
        assert!(!glob_matches("", "x"));
    }
}

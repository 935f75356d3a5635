//! Attribute providers for dynamic conditions.
//!
//! A condition marked `is_dynamic` is not read from the request. Its
//! attribute is resolved through an [`AttributeProvider`] at evaluation time.
//! The evaluator calls providers on a helper thread bounded by the
//! per-request timeout, so implementations are free to block.

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::attributes::{AccessRequest, AttributeMap, AttributeValue, is_business_hours};
use crate::error::ProviderError;

/// Resolves attribute values that are not carried on the request.
pub trait AttributeProvider: Send + Sync {
    /// Resolves attribute `name` for `request`.
    ///
    /// # Errors
    ///
    /// * [`ProviderError::UnknownAttribute`] - the provider does not know `name`
    /// * [`ProviderError::Unavailable`] - the backing source failed
    fn resolve(&self, name: &str, request: &AccessRequest) -> Result<AttributeValue, ProviderError>;
}

impl<P: AttributeProvider + ?Sized> AttributeProvider for Arc<P> {
    fn resolve(&self, name: &str, request: &AccessRequest) -> Result<AttributeValue, ProviderError> {
        (**self).resolve(name, request)
    }
}

// ============================================================================
// Static Provider
// ============================================================================

/// Serves attributes from a fixed map.
///
/// Deserializes from a plain JSON object, which is how the CLI loads
/// `--attributes` files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticAttributeProvider {
    values: AttributeMap,
}

impl StaticAttributeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an attribute (builder pattern).
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<AttributeMap> for StaticAttributeProvider {
    fn from(values: AttributeMap) -> Self {
        Self { values }
    }
}

impl AttributeProvider for StaticAttributeProvider {
    fn resolve(&self, name: &str, _request: &AccessRequest) -> Result<AttributeValue, ProviderError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownAttribute(name.to_string()))
    }
}

// ============================================================================
// Clock Provider
// ============================================================================

/// Derives time-based attributes from [`AccessRequest::timestamp`].
///
/// | Attribute           | Value                                     |
/// |---------------------|-------------------------------------------|
/// | `time_of_day`       | `"business_hours"` or `"after_hours"`     |
/// | `is_business_hours` | bool                                      |
/// | `hour`              | integer 0-23 (UTC)                        |
/// | `day_of_week`       | lowercase English day name, e.g. `"monday"` |
///
/// Business hours are 09:00-17:00 UTC, Monday to Friday.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockAttributeProvider;

impl ClockAttributeProvider {
    pub const TIME_OF_DAY: &'static str = "time_of_day";
    pub const IS_BUSINESS_HOURS: &'static str = "is_business_hours";
    pub const HOUR: &'static str = "hour";
    pub const DAY_OF_WEEK: &'static str = "day_of_week";
}

impl AttributeProvider for ClockAttributeProvider {
    fn resolve(&self, name: &str, request: &AccessRequest) -> Result<AttributeValue, ProviderError> {
        let ts = request.timestamp;
        match name {
            Self::TIME_OF_DAY => Ok(AttributeValue::from(if is_business_hours(ts) {
                "business_hours"
            } else {
                "after_hours"
            })),
            Self::IS_BUSINESS_HOURS => Ok(AttributeValue::Bool(is_business_hours(ts))),
            Self::HOUR => Ok(AttributeValue::Integer(i64::from(ts.hour()))),
            Self::DAY_OF_WEEK => Ok(AttributeValue::from(day_name(ts.weekday()))),
            _ => Err(ProviderError::UnknownAttribute(name.to_string())),
        }
    }
}

fn day_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

// ============================================================================
// Provider Chain
// ============================================================================

/// Tries providers in order; the first one that knows the attribute wins.
///
/// A provider reporting [`ProviderError::Unavailable`] stops the chain: the
/// attribute is known but its source is down, and falling through could
/// serve a value from a lower-precedence source.
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn AttributeProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider with lower precedence than those already present.
    pub fn with(mut self, provider: impl AttributeProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl AttributeProvider for ProviderChain {
    fn resolve(&self, name: &str, request: &AccessRequest) -> Result<AttributeValue, ProviderError> {
        for provider in &self.providers {
            match provider.resolve(name, request) {
                Err(ProviderError::UnknownAttribute(_)) => {}
                other => return other,
            }
        }
        Err(ProviderError::UnknownAttribute(name.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

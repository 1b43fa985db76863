//! Property values and property bags for entity data.
//!
//! Values are the currency of the whole crate: entity data, compiled query
//! parameters, and driver records all speak [`PropertyValue`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Strongly-typed value for entity properties and query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Explicit null/absence of value
    Null,
    /// String value (names, descriptions, encoded payloads)
    String(String),
    /// Integer value (counters, sequence numbers)
    Int(i64),
    /// Floating point value (scores, epoch timestamps on the wire)
    Float(f64),
    /// Boolean flag
    Bool(bool),
    /// Point in time; flattened to epoch seconds in wire form
    DateTime(OffsetDateTime),
    /// Arbitrary JSON document; serialized to text in wire form
    Json(serde_json::Value),
    /// Ordered list of values (id lists, tags)
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Render the value as parameter-debug text, quoting strings.
    pub(crate) fn debug_text(&self) -> String {
        match self {
            PropertyValue::Null => "null".to_string(),
            PropertyValue::String(s) => format!("'{s}'"),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::DateTime(dt) => format!("'{dt}'"),
            PropertyValue::Json(v) => v.to_string(),
            PropertyValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|i| i.debug_text()).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<OffsetDateTime> for PropertyValue {
    fn from(value: OffsetDateTime) -> Self {
        PropertyValue::DateTime(value)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        PropertyValue::Json(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(value: Vec<T>) -> Self {
        PropertyValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// Sorted key-value store for entity properties.
///
/// Iteration order is always sorted by field name; compiled clause text
/// depends on that determinism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap {
    data: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Create a new empty property map.
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Builder pattern: add a property and return self.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Insert a property value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.data.insert(key.into(), value.into());
    }

    /// Get a property value by key.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.data.get(key)
    }

    /// Remove a property by key.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.data.remove(key)
    }

    /// Check if a property exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Get the number of properties.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the property map is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over all properties in sorted field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.data.iter()
    }

    /// Retain only the properties whose key passes the predicate.
    pub fn retain(&mut self, mut predicate: impl FnMut(&str) -> bool) {
        self.data.retain(|k, _| predicate(k));
    }

    /// Type-safe getter for string properties.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.data.get(key) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Type-safe getter for integer properties.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.data.get(key) {
            Some(PropertyValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Type-safe getter for float properties.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.data.get(key) {
            Some(PropertyValue::Float(f)) => Some(*f),
            _ => None,
        }
    }

    /// Type-safe getter for boolean properties.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.data.get(key) {
            Some(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Type-safe getter for datetime properties.
    pub fn get_datetime(&self, key: &str) -> Option<OffsetDateTime> {
        match self.data.get(key) {
            Some(PropertyValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Type-safe getter for JSON properties.
    pub fn get_json(&self, key: &str) -> Option<&serde_json::Value> {
        match self.data.get(key) {
            Some(PropertyValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Type-safe getter for list properties.
    pub fn get_list(&self, key: &str) -> Option<&[PropertyValue]> {
        match self.data.get(key) {
            Some(PropertyValue::List(list)) => Some(list),
            _ => None,
        }
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, PropertyValue)>>(iter: T) -> Self {
        Self {
            data: BTreeMap::from_iter(iter),
        }
    }
}

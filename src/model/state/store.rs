// SPDX-License-Identifier: MIT

//! Immutable state snapshots

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

use crate::model::error::StateError;

/// Immutable key/value state with a version counter.
///
/// Every mutating operation returns a new `State` and leaves the receiver
/// untouched. The map is shared behind an `Arc`, so cloning a snapshot is
/// cheap and a write copies the map once. Keys keep insertion order, which
/// only matters for rendering.
///
/// Two states are equal when their contents are equal; the version is not
/// compared.
#[derive(Debug, Clone, Default)]
pub struct State {
    data: Arc<Map<String, Value>>,
    version: u64,
}

impl State {
    /// Create an empty state at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from an existing map at version 0
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(data),
            version: 0,
        }
    }

    fn derive(&self, data: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(data),
            version: self.version + 1,
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value by key, falling back to `default`
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Set key to value, replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = (*self.data).clone();
        data.insert(key.into(), value.into());
        self.derive(data)
    }

    /// Update key with value.
    ///
    /// When both the current and the new value are objects the new keys are
    /// merged into the current object (shallow). Otherwise behaves as `set`.
    pub fn update(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        match (self.data.get(&key), value.into()) {
            (Some(Value::Object(current)), Value::Object(new)) => {
                let mut merged = current.clone();
                for (k, v) in new {
                    merged.insert(k, v);
                }
                self.set(key, Value::Object(merged))
            }
            (_, value) => self.set(key, value),
        }
    }

    /// Remove a key
    pub fn delete(&self, key: &str) -> Self {
        let data = self
            .data
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.derive(data)
    }

    /// Append to the list stored at key (an absent key starts an empty list,
    /// a non-list value becomes the first element)
    pub fn append(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let items = match self.data.get(&key) {
            Some(Value::Array(items)) => {
                let mut items = items.clone();
                items.push(value.into());
                items
            }
            Some(other) => vec![other.clone(), value.into()],
            None => vec![value.into()],
        };
        self.set(key, Value::Array(items))
    }

    /// Add `amount` to the number stored at key (absent counts as 0).
    ///
    /// Integer values stay integral when `amount` is whole; a non-numeric
    /// value is replaced by `amount`.
    pub fn increment(&self, key: impl Into<String>, amount: f64) -> Self {
        let key = key.into();
        let current = match self.data.get(&key) {
            Some(Value::Number(n)) => n.clone(),
            _ => Number::from(0),
        };
        self.set(key, add_number(&current, amount))
    }

    /// Merge another state into this one; `other` wins on conflicting keys
    pub fn merge(&self, other: &State) -> Self {
        let mut data = (*self.data).clone();
        for (k, v) in other.data.iter() {
            data.insert(k.clone(), v.clone());
        }
        Self {
            data: Arc::new(data),
            version: self.version.max(other.version) + 1,
        }
    }

    /// Project onto the given keys (missing keys are skipped)
    pub fn subset<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let data = keys
            .iter()
            .filter_map(|k| {
                self.data
                    .get(k.as_ref())
                    .map(|v| (k.as_ref().to_string(), v.clone()))
            })
            .collect();
        Self {
            data: Arc::new(data),
            version: self.version,
        }
    }

    /// Get all keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Convert state to a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object((*self.data).clone())
    }

    /// Build a state from a JSON object
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(StateError::NotAnObject(type_name(&other).to_string())),
        }
    }

    /// Pretty-printed JSON (two-space indent)
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(&*self.data)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        Self::from_value(serde_json::from_str(json)?)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl From<Map<String, Value>> for State {
    fn from(data: Map<String, Value>) -> Self {
        Self::from_map(data)
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.data.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from_map)
    }
}

fn add_number(current: &Number, amount: f64) -> Value {
    if amount.fract() == 0.0 && amount.abs() < 2f64.powi(63) {
        if let Some(sum) = current.as_i64().and_then(|i| i.checked_add(amount as i64)) {
            return Value::from(sum);
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + amount;
    Number::from_f64(sum)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// JSON type name used in error messages
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

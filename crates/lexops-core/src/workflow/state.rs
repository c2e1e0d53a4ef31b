//! Workflow state — the per-run key/value store handed from stage to stage.
//!
//! Values are JSON so any stage can contribute fields, but reads go through
//! typed [`StateKey`] constants so a pipeline's keys carry their Rust type.
//! The store only grows or overwrites; there is no removal API.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StateError;

/// A named state slot holding a `T`.
pub struct StateKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> std::fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateKey({})", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    values: Map<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    /// Keys from `required` that are absent, in the order given.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|k| !self.values.contains_key(**k))
            .map(|k| k.to_string())
            .collect()
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Write a typed value.
    pub fn set<T: Serialize>(&mut self, key: &StateKey<T>, value: &T) -> Result<(), StateError> {
        let json = serde_json::to_value(value).map_err(|e| StateError::Type {
            key: key.name().to_string(),
            message: e.to_string(),
        })?;
        self.values.insert(key.name().to_string(), json);
        Ok(())
    }

    /// Merge a stage's output; existing keys are overwritten, none removed.
    pub fn merge(&mut self, data: Map<String, Value>) {
        for (k, v) in data {
            self.values.insert(k, v);
        }
    }

    /// Read a required typed value.
    pub fn read<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<T, StateError> {
        self.read_opt(key)?
            .ok_or_else(|| StateError::Missing(key.name().to_string()))
    }

    /// Read an optional typed value; absent and `null` both yield `None`.
    pub fn read_opt<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, StateError> {
        match self.values.get(key.name()) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| StateError::Type {
                    key: key.name().to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Read a typed value, falling back to `T::default()` when absent.
    pub fn read_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &StateKey<T>,
    ) -> Result<T, StateError> {
        Ok(self.read_opt(key)?.unwrap_or_default())
    }
}

impl From<Map<String, Value>> for WorkflowState {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

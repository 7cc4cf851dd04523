//! Test Parameters
//!
//! Parameters are an ordered `name -> JSON value` map. Effective parameters
//! are always a fresh merge of an implementation's defaults and the caller's
//! overrides; the defaults themselves are never mutated.

use crate::error::{Result, TestError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered parameter bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Empty parameter set
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter, keeping its original position on replace
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw JSON value of a parameter
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Typed access to a parameter.
    ///
    /// Fails with [`TestError::InvalidParam`] when the parameter is absent or
    /// does not deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.0.get(name).ok_or_else(|| TestError::InvalidParam {
            name: name.to_string(),
            message: "parameter is not set".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| TestError::InvalidParam {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Typed access with a fallback for absent or `null` parameters
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.get(name),
        }
    }

    /// Whether a parameter is set
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Parameter names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameter is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Effective parameters: `defaults` overridden by `overrides`.
    ///
    /// Declared defaults keep their order; undeclared overrides follow in the
    /// order the caller supplied them.
    pub fn merged(defaults: &Params, overrides: &Params) -> Params {
        let mut out = defaults.clone();
        for (name, value) in &overrides.0 {
            out.0.insert(name.clone(), value.clone());
        }
        out
    }

    /// Override names that `defaults` does not declare
    pub fn unknown_keys(&self, defaults: &Params) -> Vec<String> {
        self.0
            .keys()
            .filter(|k| !defaults.contains(k))
            .cloned()
            .collect()
    }

    /// Subset of `self` restricted to the names `declared` carries
    pub fn restricted_to(&self, declared: &Params) -> Params {
        self.0
            .iter()
            .filter(|(k, _)| declared.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Underlying JSON map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON map
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

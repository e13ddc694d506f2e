//! Typed key/value payload carried by event candidates and job runs.
//!
//! A thin newtype over a JSON object map with accessor functions that
//! default safely on missing or wrong-typed fields, so callers never
//! panic on payload shape surprises coming from the business modules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque-but-typed payload map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Insert a value, replacing any previous entry under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert for constructing payloads inline.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Look up a value by dot path (`"vessel.name"` descends into nested
    /// objects). A plain key is a one-segment path.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current: &Value = self.0.get(path.split('.').next()?)?;
        for segment in path.split('.').skip(1) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Read a string field; `None` if missing or not a string.
    pub fn read_optional_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// Read a numeric field. Numbers are returned directly; numeric
    /// strings are parsed. Anything else is `None`.
    pub fn read_optional_f64(&self, path: &str) -> Option<f64> {
        match self.get_path(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Merge `overrides` on top of this payload: override entries win on
    /// key collisions. Neither input is mutated.
    pub fn merged(&self, overrides: &Payload) -> Payload {
        let mut out = self.0.clone();
        for (k, v) in overrides.0.iter() {
            out.insert(k.clone(), v.clone());
        }
        Payload(out)
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

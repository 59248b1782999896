//! Owned record values and their canonical JSON form.
//!
//! A [`Record`] is a JSON object held by value. Cloning produces an
//! independent deep copy, so a record handed out by a cache can never alias
//! the stored entry.
//!
//! Canonical form: compact JSON with object keys sorted recursively. Two
//! records describe the same state iff their canonical strings are
//! byte-identical.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A record: field name → JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set `key`, returning the previous value if one was present.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Compact JSON with keys sorted at every depth.
    pub fn canonical_json(&self) -> String {
        canonical_string(&Value::Object(self.0.clone()))
    }

    /// SHA-256 hex digest of [`Record::canonical_json`].
    pub fn digest(&self) -> String {
        digest_hex(&self.canonical_json())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Value;

    /// Fails (returning the input) unless the value is a JSON object.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// A record after translation into the downstream wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireRecord(pub Value);

impl WireRecord {
    pub fn canonical_json(&self) -> String {
        canonical_string(&self.0)
    }
}

/// Rebuild `value` with every object's keys inserted in sorted order.
///
/// `serde_json::Map` iterates in insertion order when the `preserve_order`
/// feature is enabled anywhere in the build, so sorting is done explicitly.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Compact canonical JSON for any value.
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Indented canonical JSON for any value.
pub fn canonical_pretty(value: &Value) -> String {
    let canonical = canonicalize(value);
    // Serializing a `Value` cannot fail.
    serde_json::to_string_pretty(&canonical).unwrap_or_else(|_| canonical.to_string())
}

fn digest_hex(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    hex::encode(h.finalize())
}

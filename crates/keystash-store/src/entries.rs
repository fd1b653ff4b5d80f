//! Ordered record container and its persisted form.
//!
//! A slot is persisted as a JSON array of `[key, value]` pairs rather than a
//! JSON object, so insertion order survives any JSON implementation on the
//! other side of the file.

use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Insertion-ordered `key -> record` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entries(IndexMap<String, Value>);

impl Entries {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container from a raw JSON value.
    ///
    /// Accepts the persisted pair-list form and, for convenience, a plain
    /// JSON object. Returns `None` for anything else, including pair lists
    /// with malformed elements.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(pairs) => {
                let mut entries = Self::new();
                for pair in pairs {
                    let Value::Array(kv) = pair else {
                        return None;
                    };
                    let [key, value] = kv.as_slice() else {
                        return None;
                    };
                    entries.0.insert(key_to_string(key), value.clone());
                }
                Some(entries)
            }
            Value::Object(map) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// The persisted pair-list form.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )
    }

    /// Parse the persisted text of a slot.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize to the persisted text of a slot.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Copy of this container in reverse order.
    pub fn reversed(&self) -> Self {
        self.0
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Keep at most `limit` entries; `0` keeps everything.
    pub fn truncated(mut self, limit: usize) -> Self {
        if limit > 0 {
            self.0.truncate(limit);
        }
        self
    }

    /// Unwrap into the underlying map.
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

/// Keys written by other producers may be numbers or other scalars.
fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Deref for Entries {
    type Target = IndexMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Entries {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<IndexMap<String, Value>> for Entries {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Entries {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Entries {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Entries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for pair in &self.0 {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_json(&raw)
            .ok_or_else(|| de::Error::custom("expected an array of [key, value] pairs"))
    }
}

// ── tests ────────────────────────────────────────────────────────────

//! Read-modify-write over module records.
//!
//! A module record is one store entry whose value is an object mapping
//! module keys to sub-values, e.g. the `messaging` entry of the settings
//! store holding `{"user": {...}, "relays": [...]}`. [`rw`] reads or changes
//! one module key without disturbing its siblings.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::StoreResult;
use crate::store::Store;

/// What [`rw`] should do with a module key.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleOp {
    /// Return the current sub-value without writing.
    Read,
    /// Remove the whole entry (every module key).
    ClearEntry,
    /// Remove the module key.
    Delete,
    /// Shallow-merge fields into the existing object (incoming fields win).
    Merge(Map<String, Value>),
    /// Replace the sub-value with this object.
    Replace(Map<String, Value>),
    /// Store a value as-is.
    Set(Value),
    /// Store an ordered list, e.g. the contents of a set.
    SetList(Vec<Value>),
}

impl ModuleOp {
    /// Pick an operation from the shape of a dynamic JSON value.
    ///
    /// `null` deletes, objects merge (or replace when `override_existing`),
    /// arrays become lists, and any other value is set as-is.
    pub fn from_value(value: Value, override_existing: bool) -> Self {
        match value {
            Value::Null => Self::Delete,
            Value::Object(fields) if override_existing => Self::Replace(fields),
            Value::Object(fields) => Self::Merge(fields),
            Value::Array(items) => Self::SetList(items),
            other => Self::Set(other),
        }
    }

    /// Store the items of any collection as an ordered list.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::SetList(items.into_iter().map(Into::into).collect())
    }
}

/// Apply `op` to `module_key` inside the module record stored at `entry_key`.
///
/// Returns the sub-value just read or written (`None` after a delete or when
/// reading an absent key). Writes go through [`Store::update`], so the whole
/// read-merge-write happens under the store lock and concurrent callers
/// touching different module keys never drop each other's changes.
pub fn rw(store: &Store, entry_key: &str, module_key: &str, op: ModuleOp) -> StoreResult<Option<Value>> {
    let op = match op {
        ModuleOp::Read => {
            let value = match store.get(entry_key)? {
                Some(Value::Object(record)) => record.get(module_key).cloned(),
                _ => None,
            };
            return Ok(value);
        }
        ModuleOp::ClearEntry => {
            store.delete(entry_key)?;
            debug!(entry = entry_key, "module record cleared");
            return Ok(None);
        }
        op => op,
    };

    let mut written = None;
    store.update(entry_key, |current| {
        let mut record = match current {
            Some(Value::Object(record)) => record.clone(),
            _ => Map::new(),
        };
        written = apply(&mut record, module_key, op);
        Some(Value::Object(record))
    })?;
    debug!(entry = entry_key, module = module_key, "module record written");
    Ok(written)
}

/// Apply a write operation to one module key of `record`.
fn apply(record: &mut Map<String, Value>, module_key: &str, op: ModuleOp) -> Option<Value> {
    let next = match op {
        ModuleOp::Delete => {
            record.shift_remove(module_key);
            return None;
        }
        ModuleOp::Merge(fields) => {
            let merged = match record.get(module_key) {
                Some(Value::Object(existing)) => {
                    let mut existing = existing.clone();
                    existing.extend(fields);
                    existing
                }
                _ => fields,
            };
            Value::Object(merged)
        }
        ModuleOp::Replace(fields) => Value::Object(fields),
        ModuleOp::Set(value) => value,
        ModuleOp::SetList(items) => Value::Array(items),
        // Handled by `rw` before taking the lock.
        ModuleOp::Read | ModuleOp::ClearEntry => return record.get(module_key).cloned(),
    };
    record.insert(module_key.to_string(), next.clone());
    Some(next)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn store() -> Store {
        Store::builder("settings")
            .open(Arc::new(MemoryBackend::new()))
            .unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn set_then_read_scalar() {
        let s = store();
        rw(&s, "settings", "theme", ModuleOp::Set(json!("dark"))).unwrap();
        let read = rw(&s, "settings", "theme", ModuleOp::Read).unwrap();
        assert_eq!(read, Some(json!("dark")));
    }

    #[test]
    fn read_does_not_write() {
        let s = store();
        assert_eq!(rw(&s, "settings", "theme", ModuleOp::Read).unwrap(), None);
        assert!(s.get("settings").unwrap().is_none());
    }

    #[test]
    fn merge_keeps_existing_fields() {
        let s = store();
        rw(&s, "settings", "prefs", ModuleOp::Merge(fields(json!({"a": 1})))).unwrap();
        let out = rw(&s, "settings", "prefs", ModuleOp::Merge(fields(json!({"b": 2})))).unwrap();

        assert_eq!(out, Some(json!({"a": 1, "b": 2})));
        assert_eq!(
            rw(&s, "settings", "prefs", ModuleOp::Read).unwrap(),
            Some(json!({"a": 1, "b": 2}))
        );
    }

    #[test]
    fn replace_discards_existing_fields() {
        let s = store();
        rw(&s, "settings", "prefs", ModuleOp::Merge(fields(json!({"a": 1})))).unwrap();
        let out = rw(&s, "settings", "prefs", ModuleOp::Replace(fields(json!({"b": 2})))).unwrap();
        assert_eq!(out, Some(json!({"b": 2})));
    }

    #[test]
    fn siblings_are_untouched() {
        let s = store();
        rw(&s, "settings", "theme", ModuleOp::Set(json!("dark"))).unwrap();
        rw(&s, "settings", "lang", ModuleOp::Set(json!("nb"))).unwrap();
        rw(&s, "settings", "lang", ModuleOp::Delete).unwrap();

        assert_eq!(s.get("settings").unwrap(), Some(json!({"theme": "dark"})));
    }

    #[test]
    fn clear_entry_removes_whole_record() {
        let s = store();
        rw(&s, "settings", "theme", ModuleOp::Set(json!("dark"))).unwrap();
        s.set("other", json!(1)).unwrap();

        rw(&s, "settings", "ignored", ModuleOp::ClearEntry).unwrap();
        assert!(s.get("settings").unwrap().is_none());
        assert_eq!(s.get("other").unwrap(), Some(json!(1)));
    }

    #[test]
    fn sets_are_stored_as_lists() {
        let s = store();
        let relays: BTreeSet<&str> = ["wss://b", "wss://a", "wss://b"].into_iter().collect();
        let out = rw(&s, "settings", "relays", ModuleOp::list(relays)).unwrap();
        assert_eq!(out, Some(json!(["wss://a", "wss://b"])));
    }

    #[test]
    fn from_value_discriminates_shapes() {
        assert_eq!(ModuleOp::from_value(Value::Null, false), ModuleOp::Delete);
        assert_eq!(
            ModuleOp::from_value(json!({"a": 1}), false),
            ModuleOp::Merge(fields(json!({"a": 1})))
        );
        assert_eq!(
            ModuleOp::from_value(json!({"a": 1}), true),
            ModuleOp::Replace(fields(json!({"a": 1})))
        );
        assert_eq!(ModuleOp::from_value(json!([1]), false), ModuleOp::SetList(vec![json!(1)]));
        assert_eq!(ModuleOp::from_value(json!(false), false), ModuleOp::Set(json!(false)));
    }

    #[test]
    fn non_object_entry_is_treated_as_empty() {
        let s = store();
        s.set("settings", json!("legacy string")).unwrap();
        rw(&s, "settings", "theme", ModuleOp::Set(json!("light"))).unwrap();
        assert_eq!(s.get("settings").unwrap(), Some(json!({"theme": "light"})));
    }

    #[test]
    fn concurrent_writers_keep_every_module_key() {
        let s = store();
        std::thread::scope(|scope| {
            for t in 0..8 {
                let s = &s;
                scope.spawn(move || {
                    for i in 0..50 {
                        rw(s, "settings", &format!("t{t}_{i}"), ModuleOp::Set(json!(i))).unwrap();
                    }
                });
            }
        });

        let record = s.get("settings").unwrap().unwrap();
        assert_eq!(record.as_object().map(Map::len), Some(400));
        assert_eq!(
            rw(&s, "settings", "t7_49", ModuleOp::Read).unwrap(),
            Some(json!(49))
        );
    }
}

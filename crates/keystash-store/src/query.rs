//! Multi-field search and field sort over an [`Entries`] snapshot.
//!
//! Both functions are pure: they never touch a backend and return a new
//! container, leaving the input untouched.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use tracing::warn;

use crate::entries::Entries;

/// Field criteria: `field name -> wanted value`.
pub type Criteria = Map<String, Value>;

/// How criteria are matched against records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Require equality instead of substring / element membership.
    pub match_exact: bool,
    /// Require every field to match (AND) instead of any field (OR).
    pub match_all: bool,
    /// Lower-case string operands before comparing.
    pub ignore_case: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            match_exact: false,
            match_all: true,
            ignore_case: true,
        }
    }
}

impl SearchOptions {
    /// Partial, AND, case-insensitive.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, exact: bool) -> Self {
        self.match_exact = exact;
        self
    }

    pub fn all(mut self, all: bool) -> Self {
        self.match_all = all;
        self
    }

    pub fn ignore_case(mut self, ignore: bool) -> Self {
        self.ignore_case = ignore;
        self
    }
}

/// Return every entry whose record matches `criteria`, in source order.
///
/// An empty criteria map matches nothing. A field missing from a record, or
/// a record that is not an object, never matches that field.
pub fn search(entries: &Entries, criteria: &Criteria, opts: SearchOptions) -> Entries {
    if criteria.is_empty() {
        return Entries::new();
    }

    entries
        .iter()
        .filter(|(_, record)| record_matches(record, criteria, opts))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn record_matches(record: &Value, criteria: &Criteria, opts: SearchOptions) -> bool {
    let mut fields = criteria
        .iter()
        .map(|(field, wanted)| match record.get(field) {
            Some(actual) => field_matches(actual, wanted, opts),
            None => false,
        });

    if opts.match_all {
        fields.all(|hit| hit)
    } else {
        fields.any(|hit| hit)
    }
}

fn field_matches(actual: &Value, wanted: &Value, opts: SearchOptions) -> bool {
    if !opts.match_exact {
        match actual {
            Value::Array(items) => {
                return items.iter().any(|item| values_equal(item, wanted, opts.ignore_case));
            }
            Value::String(_) | Value::Number(_) => {
                if let (Some(haystack), Some(needle)) = (as_text(actual), as_text(wanted)) {
                    return if opts.ignore_case {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    } else {
                        haystack.contains(needle.as_str())
                    };
                }
            }
            _ => {}
        }
    }
    values_equal(actual, wanted, opts.ignore_case)
}

/// Strings and numbers take part in substring matching as text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value, ignore_case: bool) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) if ignore_case => a.to_lowercase() == b.to_lowercase(),
        _ => a == b,
    }
}

/// Sort entries ascending by `record[field]`, or descending when `reverse`.
///
/// If any record is not an object the collection is returned unchanged.
/// Ties keep their source order in ascending mode; descending mode is the
/// exact reverse of the ascending result.
pub fn sort(entries: &Entries, field: &str, reverse: bool, case_insensitive: bool) -> Entries {
    if let Some((key, _)) = entries.iter().find(|(_, v)| !v.is_object()) {
        warn!(field, key = %key, "sort skipped: collection holds non-object records");
        return entries.clone();
    }

    let mut pairs: Vec<(&String, &Value)> = entries.iter().collect();
    pairs.sort_by(|(_, a), (_, b)| {
        compare_values(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
            case_insensitive,
        )
    });
    if reverse {
        pairs.reverse();
    }

    pairs.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Total order over JSON values: null < bool < number < string < others.
///
/// Arrays and objects compare by their serialized text.
pub fn compare_values(a: &Value, b: &Value, case_insensitive: bool) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) if case_insensitive => {
            a.to_lowercase().cmp(&b.to_lowercase())
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match rank(a).cmp(&rank(b)) {
            Ordering::Equal => a.to_string().cmp(&b.to_string()),
            other => other,
        },
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria(value: Value) -> Criteria {
        match value {
            Value::Object(map) => map,
            _ => panic!("criteria must be an object"),
        }
    }

    fn people() -> Entries {
        [
            ("u1", json!({"name": "Ann", "city": "Oslo", "age": 31, "tags": ["admin", "ops"]})),
            ("u2", json!({"name": "Bob", "city": "Bergen", "age": 42, "tags": ["ops"]})),
            ("u3", json!({"name": "Joanna", "city": "Oslo", "age": 25})),
        ]
        .into_iter()
        .collect()
    }

    fn keys(entries: &Entries) -> Vec<&str> {
        entries.keys().map(String::as_str).collect()
    }

    #[test]
    fn partial_case_insensitive() {
        let hits = search(&people(), &criteria(json!({"name": "an"})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u1", "u3"]);
    }

    #[test]
    fn exact_never_matches_substring() {
        let opts = SearchOptions::new().exact(true);
        let hits = search(&people(), &criteria(json!({"name": "an"})), opts);
        assert!(hits.is_empty());

        let hits = search(&people(), &criteria(json!({"name": "ann"})), opts);
        assert_eq!(keys(&hits), ["u1"]);
    }

    #[test]
    fn case_sensitive_partial() {
        let opts = SearchOptions::new().ignore_case(false);
        let hits = search(&people(), &criteria(json!({"name": "an"})), opts);
        assert_eq!(keys(&hits), ["u3"]);
    }

    #[test]
    fn and_is_intersection_or_is_union() {
        let c = criteria(json!({"city": "Oslo", "tags": "ops"}));

        let and = search(&people(), &c, SearchOptions::new());
        assert_eq!(keys(&and), ["u1"]);

        let or = search(&people(), &c, SearchOptions::new().all(false));
        assert_eq!(keys(&or), ["u1", "u2", "u3"]);
    }

    #[test]
    fn array_membership() {
        let hits = search(&people(), &criteria(json!({"tags": "ADMIN"})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u1"]);
    }

    #[test]
    fn numbers_partial_match_as_text() {
        let hits = search(&people(), &criteria(json!({"age": "4"})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u2"]);

        let hits = search(&people(), &criteria(json!({"age": 3})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u1"]);

        let exact = SearchOptions::new().exact(true);
        let hits = search(&people(), &criteria(json!({"age": 25})), exact);
        assert_eq!(keys(&hits), ["u3"]);
    }

    #[test]
    fn empty_criteria_matches_nothing() {
        assert!(search(&people(), &Criteria::new(), SearchOptions::new()).is_empty());
    }

    #[test]
    fn missing_field_and_scalar_records_do_not_match() {
        let mut entries = people();
        entries.insert("raw".into(), json!("Oslo"));

        let hits = search(&entries, &criteria(json!({"tags": "ops"})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u1", "u2"]);

        let hits = search(&entries, &criteria(json!({"city": "oslo"})), SearchOptions::new());
        assert_eq!(keys(&hits), ["u1", "u3"]);
    }

    #[test]
    fn sort_ascending_and_descending() {
        let entries: Entries = [("x", json!({"name": "b"})), ("y", json!({"name": "a"}))]
            .into_iter()
            .collect();

        assert_eq!(keys(&sort(&entries, "name", false, true)), ["y", "x"]);
        assert_eq!(keys(&sort(&entries, "name", true, true)), ["x", "y"]);
    }

    #[test]
    fn sort_of_sorted_is_stable_and_reverse_is_exact() {
        let entries: Entries = [
            ("a", json!({"n": 1})),
            ("b", json!({"n": 2})),
            ("c", json!({"n": 2})),
            ("d", json!({"n": 10})),
        ]
        .into_iter()
        .collect();

        let asc = sort(&entries, "n", false, true);
        assert_eq!(keys(&asc), ["a", "b", "c", "d"]);

        let desc = sort(&entries, "n", true, true);
        assert_eq!(keys(&desc), ["d", "c", "b", "a"]);
    }

    #[test]
    fn sort_case_folding() {
        let entries: Entries = [("1", json!({"s": "b"})), ("2", json!({"s": "A"}))]
            .into_iter()
            .collect();
        assert_eq!(keys(&sort(&entries, "s", false, true)), ["2", "1"]);
        // Upper-case sorts first byte-wise.
        assert_eq!(keys(&sort(&entries, "s", false, false)), ["2", "1"]);

        let entries: Entries = [("1", json!({"s": "B"})), ("2", json!({"s": "a"}))]
            .into_iter()
            .collect();
        assert_eq!(keys(&sort(&entries, "s", false, true)), ["2", "1"]);
        assert_eq!(keys(&sort(&entries, "s", false, false)), ["1", "2"]);
    }

    #[test]
    fn sort_guard_on_non_object_records() {
        let entries: Entries = [("b", json!({"n": 2})), ("a", json!(1))].into_iter().collect();
        assert_eq!(sort(&entries, "n", false, true), entries);
    }

    #[test]
    fn missing_sort_field_sorts_first() {
        let entries: Entries = [("with", json!({"n": 0})), ("without", json!({}))]
            .into_iter()
            .collect();
        assert_eq!(keys(&sort(&entries, "n", false, true)), ["without", "with"]);
    }
}

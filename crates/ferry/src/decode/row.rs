//! Decoded rows and the synthetic fields attached to them.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Path of the file a record came from.
pub const SDC_SOURCE_FILE: &str = "_sdc_source_file";
/// Line number of a record within its file, counting the header row.
pub const SDC_SOURCE_LINENO: &str = "_sdc_source_lineno";
/// Catch-all for values without a unique known field.
pub const SDC_EXTRA: &str = "_sdc_extra";

/// Returns true for the engine-owned field names.
pub fn is_synthetic(name: &str) -> bool {
    matches!(name, SDC_SOURCE_FILE | SDC_SOURCE_LINENO | SDC_EXTRA)
}

/// One decoded line or record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRow {
    /// Field values in column/key order.
    pub fields: IndexMap<String, Value>,
    /// Entries destined for `_sdc_extra`, each a single-key object
    /// (or `{"no_headers": [...]}` for values past the last header).
    pub extras: Vec<Value>,
}

impl DecodedRow {
    pub fn new(fields: IndexMap<String, Value>) -> Self {
        Self {
            fields,
            extras: Vec::new(),
        }
    }

    /// A row with every name mapped to null.
    pub fn nulls<'a>(names: impl IntoIterator<Item = &'a String>) -> Self {
        Self::new(names.into_iter().map(|n| (n.clone(), Value::Null)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.extras.is_empty()
    }

    /// Move every field not in `known`, and any key shadowing a synthetic
    /// field, into the extras list.
    pub fn route_unknown(&mut self, known: &HashSet<String>) {
        let unknown: Vec<String> = self
            .fields
            .keys()
            .filter(|k| !known.contains(k.as_str()) || is_synthetic(k))
            .cloned()
            .collect();

        for key in unknown {
            if let Some(value) = self.fields.shift_remove(&key) {
                self.extras.push(single_entry(key, value));
            }
        }
    }

    /// Build the emitted record: fields, source path, line number and extras.
    /// Input keys named like a synthetic field are kept in the extras.
    pub fn into_record(self, source_file: &str, lineno: u64) -> Map<String, Value> {
        let mut extras = self.extras;
        let mut record = Map::new();
        for (key, value) in self.fields {
            if is_synthetic(&key) {
                extras.push(single_entry(key, value));
            } else {
                record.insert(key, value);
            }
        }
        record.insert(SDC_SOURCE_FILE.to_string(), Value::from(source_file));
        record.insert(SDC_SOURCE_LINENO.to_string(), Value::from(lineno));
        if !extras.is_empty() {
            record.insert(SDC_EXTRA.to_string(), Value::Array(extras));
        }
        record
    }
}

fn single_entry(key: String, value: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(key, value);
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_unknown_keeps_order() {
        let mut row = DecodedRow::new(IndexMap::from([
            ("id".to_string(), json!(1)),
            ("name".to_string(), json!("abc")),
            ("age".to_string(), json!(3)),
        ]));
        let known = HashSet::from(["id".to_string()]);

        row.route_unknown(&known);

        assert_eq!(row.fields.keys().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(row.extras, vec![json!({"name": "abc"}), json!({"age": 3})]);
    }

    #[test]
    fn test_into_record_adds_synthetic_fields() {
        let row = DecodedRow::new(IndexMap::from([("id".to_string(), json!("1"))]));
        let record = row.into_record("/exports/a.csv", 2);

        assert_eq!(
            Value::Object(record),
            json!({"id": "1", "_sdc_source_file": "/exports/a.csv", "_sdc_source_lineno": 2})
        );
    }

    #[test]
    fn test_into_record_includes_extras() {
        let mut row = DecodedRow::new(IndexMap::new());
        row.extras.push(json!({"name": "y"}));
        let record = row.into_record("a.csv", 3);

        assert_eq!(record[SDC_EXTRA], json!([{"name": "y"}]));
    }

    #[test]
    fn test_synthetic_named_keys_move_to_extras() {
        let mut row = DecodedRow::new(IndexMap::from([
            ("id".to_string(), json!(1)),
            (SDC_SOURCE_FILE.to_string(), json!("spoofed")),
            (SDC_EXTRA.to_string(), json!("x")),
        ]));
        let known = HashSet::from([
            "id".to_string(),
            SDC_SOURCE_FILE.to_string(),
            SDC_SOURCE_LINENO.to_string(),
            SDC_EXTRA.to_string(),
        ]);

        row.route_unknown(&known);

        assert_eq!(row.fields.keys().collect::<Vec<_>>(), vec!["id"]);
        let record = row.into_record("/exports/a.jsonl", 2);
        assert_eq!(record[SDC_SOURCE_FILE], json!("/exports/a.jsonl"));
        assert_eq!(
            record[SDC_EXTRA],
            json!([{"_sdc_source_file": "spoofed"}, {"_sdc_extra": "x"}])
        );
    }

    #[test]
    fn test_into_record_never_lets_input_shadow_synthetic_fields() {
        let row = DecodedRow::new(IndexMap::from([
            ("id".to_string(), json!(1)),
            (SDC_SOURCE_LINENO.to_string(), json!(99)),
        ]));
        let record = row.into_record("a.jsonl", 4);

        assert_eq!(record[SDC_SOURCE_LINENO], json!(4));
        assert_eq!(record[SDC_EXTRA], json!([{"_sdc_source_lineno": 99}]));
    }
}

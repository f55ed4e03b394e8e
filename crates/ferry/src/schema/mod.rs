//! Schema inference from sampled rows.
//!
//! Each sampled value gets a [`TypeTag`]; tags are counted per field and
//! collapsed by [`pick_datatype`]. Every rendered scalar property also
//! accepts `string`, so a wrong guess never rejects a record downstream.

pub mod sampling;

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::decode::{DecodedRow, SDC_EXTRA, SDC_SOURCE_FILE, SDC_SOURCE_LINENO};

/// Element type of a non-empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    Integer,
    Number,
    String,
    Dict,
}

/// Inferred type of one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Number,
    String,
    DateTime,
    Dict,
    /// `None` for an empty list.
    List(Option<ElementTag>),
}

impl TypeTag {
    fn is_structured(self) -> bool {
        matches!(self, TypeTag::Dict | TypeTag::List(_))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let element = |e: &ElementTag| match e {
            ElementTag::Integer => "integer",
            ElementTag::Number => "number",
            ElementTag::String => "string",
            ElementTag::Dict => "dict",
        };
        match self {
            TypeTag::Integer => f.write_str("integer"),
            TypeTag::Number => f.write_str("number"),
            TypeTag::String => f.write_str("string"),
            TypeTag::DateTime => f.write_str("date-time"),
            TypeTag::Dict => f.write_str("dict"),
            TypeTag::List(None) => f.write_str("list"),
            TypeTag::List(Some(e)) => write!(f, "list.{}", element(e)),
        }
    }
}

/// Per-field tag counts for one discovery pass.
pub type FieldTypeCounts = IndexMap<String, HashMap<TypeTag, usize>>;

/// Type of a single value, or `None` for null and empty strings.
///
/// Numbers are recognised from the value's string form, so `"12"` from a
/// CSV and `12` from JSON infer the same way.
pub fn infer(field: &str, value: &Value, date_overrides: &[String]) -> Option<TypeTag> {
    match value {
        Value::Null => return None,
        Value::String(s) if s.is_empty() => return None,
        _ => {}
    }

    if date_overrides.iter().any(|d| d == field) {
        return Some(TypeTag::DateTime);
    }

    Some(match value {
        Value::Array(items) => TypeTag::List(items.first().map(|first| infer_element(field, first))),
        Value::Object(_) => TypeTag::Dict,
        other => scalar_tag(&string_form(other)),
    })
}

/// Lists are inspected one level deep only.
fn infer_element(field: &str, value: &Value) -> ElementTag {
    match value {
        Value::Array(_) => {
            warn!(field, "Nested lists are not supported; typing elements as string");
            ElementTag::String
        }
        Value::Object(_) => ElementTag::Dict,
        Value::Null => ElementTag::String,
        other => match scalar_tag(&string_form(other)) {
            TypeTag::Integer => ElementTag::Integer,
            TypeTag::Number => ElementTag::Number,
            _ => ElementTag::String,
        },
    }
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_tag(text: &str) -> TypeTag {
    let trimmed = text.trim();
    if is_integer(trimmed) {
        TypeTag::Integer
    } else if trimmed.parse::<f64>().is_ok() {
        TypeTag::Number
    } else {
        TypeTag::String
    }
}

/// Optional sign followed by digits, of any length.
fn is_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Structured tags in the order they win when several were observed.
const STRUCTURED_PRIORITY: [TypeTag; 6] = [
    TypeTag::List(Some(ElementTag::Dict)),
    TypeTag::List(Some(ElementTag::Number)),
    TypeTag::List(Some(ElementTag::Integer)),
    TypeTag::List(Some(ElementTag::String)),
    TypeTag::List(None),
    TypeTag::Dict,
];

/// Collapse the tags observed for one field into a single type.
///
/// Date-time wins, then any structured tag, then a lone scalar; integer and
/// number widen to number and everything else falls back to string.
pub fn pick_datatype(counts: &HashMap<TypeTag, usize>) -> TypeTag {
    let seen = |tag: &TypeTag| counts.get(tag).is_some_and(|n| *n > 0);

    if seen(&TypeTag::DateTime) {
        return TypeTag::DateTime;
    }
    if let Some(tag) = STRUCTURED_PRIORITY.iter().find(|t| seen(t)) {
        return *tag;
    }

    let scalars: Vec<TypeTag> = counts
        .iter()
        .filter(|(tag, n)| **n > 0 && !tag.is_structured())
        .map(|(tag, _)| *tag)
        .collect();

    match scalars.as_slice() {
        [single] => *single,
        [a, b] if matches!((a, b), (TypeTag::Integer, TypeTag::Number) | (TypeTag::Number, TypeTag::Integer)) => {
            TypeTag::Number
        }
        _ => TypeTag::String,
    }
}

fn nullable_string() -> Value {
    json!({"type": ["null", "string"]})
}

/// JSON-schema fragment for a picked type.
pub fn datatype_schema(tag: TypeTag) -> Value {
    match tag {
        TypeTag::DateTime => json!({
            "anyOf": [
                {"type": ["null", "string"], "format": "date-time"},
                nullable_string(),
            ]
        }),
        TypeTag::Dict => json!({
            "anyOf": [
                {"type": "object", "properties": {}},
                nullable_string(),
            ]
        }),
        TypeTag::List(element) => {
            let items = match element {
                None => nullable_string(),
                Some(ElementTag::Dict) => datatype_schema(TypeTag::Dict),
                Some(ElementTag::Integer) => datatype_schema(TypeTag::Integer),
                Some(ElementTag::Number) => datatype_schema(TypeTag::Number),
                Some(ElementTag::String) => datatype_schema(TypeTag::String),
            };
            json!({
                "anyOf": [
                    {"type": "array", "items": items},
                    nullable_string(),
                ]
            })
        }
        TypeTag::String => nullable_string(),
        TypeTag::Integer => json!({"type": ["null", "integer", "string"]}),
        TypeTag::Number => json!({"type": ["null", "number", "string"]}),
    }
}

/// Count the tags of every field across `samples`, in first-seen order.
pub fn count_types(samples: &[DecodedRow], date_overrides: &[String]) -> FieldTypeCounts {
    let mut counts = FieldTypeCounts::new();
    for row in samples {
        for (field, value) in &row.fields {
            let field_counts = counts.entry(field.clone()).or_default();
            if let Some(tag) = infer(field, value, date_overrides) {
                *field_counts.entry(tag).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Properties inferred from `samples`.
pub fn generate_schema(samples: &[DecodedRow], date_overrides: &[String]) -> Map<String, Value> {
    count_types(samples, date_overrides)
        .into_iter()
        .map(|(field, counts)| (field, datatype_schema(pick_datatype(&counts))))
        .collect()
}

/// Schemas of the fields the engine adds to every record.
pub fn synthetic_properties() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(SDC_SOURCE_FILE.to_string(), json!({"type": "string"}));
    properties.insert(SDC_SOURCE_LINENO.to_string(), json!({"type": "integer"}));
    properties.insert(
        SDC_EXTRA.to_string(),
        json!({
            "type": "array",
            "items": {"anyOf": [{"type": "object", "properties": {}}, {"type": "string"}]}
        }),
    );
    properties
}

/// Full table schema: inferred properties followed by the synthetic ones.
pub fn table_schema(mut properties: Map<String, Value>) -> Value {
    properties.extend(synthetic_properties());
    json!({"type": "object", "properties": properties})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> DecodedRow {
        DecodedRow::new(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    fn tags(pairs: &[(TypeTag, usize)]) -> HashMap<TypeTag, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_infer_scalars_from_string_form() {
        assert_eq!(infer("a", &json!("12"), &[]), Some(TypeTag::Integer));
        assert_eq!(infer("a", &json!(12), &[]), Some(TypeTag::Integer));
        assert_eq!(infer("a", &json!("-3"), &[]), Some(TypeTag::Integer));
        assert_eq!(infer("a", &json!("1.5"), &[]), Some(TypeTag::Number));
        assert_eq!(infer("a", &json!(12.0), &[]), Some(TypeTag::Number));
        assert_eq!(infer("a", &json!("1e5"), &[]), Some(TypeTag::Number));
        assert_eq!(infer("a", &json!("abc"), &[]), Some(TypeTag::String));
        assert_eq!(infer("a", &json!(true), &[]), Some(TypeTag::String));
        assert_eq!(infer("a", &json!("99999999999999999999999"), &[]), Some(TypeTag::Integer));
    }

    #[test]
    fn test_infer_null_and_empty() {
        assert_eq!(infer("a", &Value::Null, &[]), None);
        assert_eq!(infer("a", &json!(""), &[]), None);
    }

    #[test]
    fn test_infer_structures() {
        assert_eq!(infer("a", &json!([]), &[]), Some(TypeTag::List(None)));
        assert_eq!(
            infer("a", &json!([1, "x"]), &[]),
            Some(TypeTag::List(Some(ElementTag::Integer)))
        );
        assert_eq!(
            infer("a", &json!([{"k": 1}]), &[]),
            Some(TypeTag::List(Some(ElementTag::Dict)))
        );
        assert_eq!(
            infer("a", &json!([[1, 2]]), &[]),
            Some(TypeTag::List(Some(ElementTag::String)))
        );
        assert_eq!(infer("a", &json!({"k": 1}), &[]), Some(TypeTag::Dict));
    }

    #[test]
    fn test_date_override_wins_over_value() {
        let overrides = vec!["created".to_string()];
        assert_eq!(infer("created", &json!("not a date"), &overrides), Some(TypeTag::DateTime));
        assert_eq!(infer("created", &json!(5), &overrides), Some(TypeTag::DateTime));
        assert_eq!(infer("created", &json!(""), &overrides), None);
    }

    #[test]
    fn test_pick_datatype() {
        use TypeTag::*;

        assert_eq!(pick_datatype(&tags(&[(Integer, 3)])), Integer);
        assert_eq!(pick_datatype(&tags(&[(Integer, 3), (Number, 1)])), Number);
        assert_eq!(pick_datatype(&tags(&[(Integer, 3), (String, 1)])), String);
        assert_eq!(pick_datatype(&tags(&[(Integer, 3), (Number, 1), (String, 1)])), String);
        assert_eq!(pick_datatype(&tags(&[(Integer, 3), (DateTime, 1)])), DateTime);
        assert_eq!(pick_datatype(&tags(&[(Integer, 3), (Dict, 1)])), Dict);
        assert_eq!(
            pick_datatype(&tags(&[(List(None), 1), (List(Some(ElementTag::Integer)), 1)])),
            List(Some(ElementTag::Integer))
        );
        assert_eq!(pick_datatype(&HashMap::new()), String);
    }

    #[test]
    fn test_type_unification() {
        let samples = vec![
            row(&[("a", json!("1")), ("b", json!("1"))]),
            row(&[("a", json!("2.5")), ("b", json!("7"))]),
        ];
        let properties = generate_schema(&samples, &[]);

        assert_eq!(properties["a"], json!({"type": ["null", "number", "string"]}));
        assert_eq!(properties["b"], json!({"type": ["null", "integer", "string"]}));
    }

    #[test]
    fn test_date_override_rendering() {
        let samples = vec![row(&[("when", json!("yesterday-ish"))])];
        let properties = generate_schema(&samples, &["when".to_string()]);

        assert_eq!(
            properties["when"],
            json!({
                "anyOf": [
                    {"type": ["null", "string"], "format": "date-time"},
                    {"type": ["null", "string"]}
                ]
            })
        );
    }

    #[test]
    fn test_structured_rendering() {
        assert_eq!(
            datatype_schema(TypeTag::List(Some(ElementTag::Integer))),
            json!({
                "anyOf": [
                    {"type": "array", "items": {"type": ["null", "integer", "string"]}},
                    {"type": ["null", "string"]}
                ]
            })
        );
        assert_eq!(
            datatype_schema(TypeTag::List(None)),
            json!({
                "anyOf": [
                    {"type": "array", "items": {"type": ["null", "string"]}},
                    {"type": ["null", "string"]}
                ]
            })
        );
        assert_eq!(
            datatype_schema(TypeTag::Dict),
            json!({"anyOf": [{"type": "object", "properties": {}}, {"type": ["null", "string"]}]})
        );
    }

    #[test]
    fn test_all_null_field_is_string() {
        let samples = vec![row(&[("id", Value::Null)])];
        let properties = generate_schema(&samples, &[]);
        assert_eq!(properties["id"], json!({"type": ["null", "string"]}));
    }

    #[test]
    fn test_first_seen_field_order() {
        let samples = vec![
            row(&[("b", json!("1")), ("a", json!("1"))]),
            row(&[("c", json!("1")), ("a", json!("1"))]),
        ];
        let properties = generate_schema(&samples, &[]);
        assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_table_schema_has_synthetic_fields() {
        let schema = table_schema(Map::new());
        let properties = schema["properties"].as_object().unwrap();

        assert_eq!(schema["type"], json!("object"));
        assert_eq!(properties[SDC_SOURCE_FILE], json!({"type": "string"}));
        assert_eq!(properties[SDC_SOURCE_LINENO], json!({"type": "integer"}));
        assert_eq!(properties[SDC_EXTRA]["type"], json!("array"));
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(TypeTag::List(Some(ElementTag::Dict)).to_string(), "list.dict");
        assert_eq!(TypeTag::DateTime.to_string(), "date-time");
    }
}

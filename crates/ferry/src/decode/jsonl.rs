//! Line-delimited JSON decoding.
//!
//! One object per line. Blank lines and `{}` are skipped, as are lines that
//! fail to parse or hold something other than an object. Unknown keys stay
//! on the row here; the sync engine moves them into `_sdc_extra` when it
//! knows the published schema.

use indexmap::IndexSet;
use serde_json::Value;
use tracing::warn;

use super::row::DecodedRow;
use super::text::decode_text;
use super::{DecodeOptions, DecodedStream, FileFormat, Member, RecordDecoder, validate_columns};
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl RecordDecoder for JsonLinesDecoder {
    fn format(&self) -> FileFormat {
        FileFormat::JsonLines
    }

    fn decode(&self, member: Member, options: &DecodeOptions) -> Result<DecodedStream, DecodeError> {
        let text = decode_text(&member.data, options.encoding);

        let mut keys = IndexSet::new();
        let mut rows = Vec::new();
        let mut malformed = 0usize;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(object)) if object.is_empty() => {}
                Ok(Value::Object(object)) => {
                    keys.extend(object.keys().cloned());
                    rows.push(DecodedRow::new(object.into_iter().collect()));
                }
                Ok(other) => {
                    malformed += 1;
                    warn!(
                        path = %member.path,
                        line = index + 1,
                        kind = json_kind(&other),
                        "Skipping line that is not a JSON object"
                    );
                }
                Err(e) => {
                    malformed += 1;
                    warn!(path = %member.path, line = index + 1, error = %e, "Skipping malformed JSON line");
                }
            }
        }

        if malformed > 0 {
            warn!(path = %member.path, malformed, decoded = rows.len(), "File had malformed lines");
        }

        let headers: Vec<String> = keys.into_iter().collect();
        if !rows.is_empty() {
            validate_columns(&member.path, &headers, options)?;
        }

        Ok(DecodedStream::new(
            FileFormat::JsonLines,
            member.path,
            headers,
            rows.into_iter(),
        ))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSpec;
    use serde_json::json;

    fn decode(data: &str, table: &TableSpec) -> Result<DecodedStream, DecodeError> {
        let options = DecodeOptions::for_table(table, "utf-8").unwrap();
        JsonLinesDecoder.decode(Member::new("/exports/a.jsonl", data.as_bytes().to_vec()), &options)
    }

    #[test]
    fn test_skips_blank_empty_and_malformed_lines() {
        let data = "{\"id\": 1, \"name\": \"a\"}\n\n{}\n{not json\n[1,2]\n{\"id\": 2, \"tags\": [\"x\"]}\n";
        let stream = decode(data, &TableSpec::new("t", "/", ".*")).unwrap();

        assert_eq!(stream.headers, vec!["id", "name", "tags"]);
        let rows: Vec<_> = stream.collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields["id"], json!(1));
        assert_eq!(rows[1].fields["tags"], json!(["x"]));
    }

    #[test]
    fn test_key_properties_checked_across_all_records() {
        let table = TableSpec::new("t", "/", ".*").with_key_properties(["id", "uuid"]);
        let data = "{\"id\": 1}\n{\"uuid\": \"u\"}\n";
        assert!(decode(data, &table).is_ok());

        let err = decode("{\"id\": 1}\n", &table).unwrap_err();
        assert!(matches!(err, DecodeError::MissingKeyProperties { .. }));
    }

    #[test]
    fn test_empty_file_is_not_validated() {
        let table = TableSpec::new("t", "/", ".*").with_key_properties(["id"]);
        let stream = decode("\n\n", &table).unwrap();
        assert!(stream.headers.is_empty());
    }

    #[test]
    fn test_native_values_are_kept() {
        let rows: Vec<_> = decode("{\"n\": 1.5, \"ok\": true, \"meta\": {\"a\": 1}}\n", &TableSpec::new("t", "/", ".*"))
            .unwrap()
            .collect();
        assert_eq!(rows[0].fields["n"], json!(1.5));
        assert_eq!(rows[0].fields["ok"], json!(true));
        assert_eq!(rows[0].fields["meta"], json!({"a": 1}));
    }
}

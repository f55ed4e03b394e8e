//! Delimited text (CSV, TSV, ...) decoding.
//!
//! The first non-blank record is the header. A repeated column name keeps
//! its first slot; later occurrences, and columns outside the published
//! schema, land in `_sdc_extra` as `{name: value}`. Values past the last
//! header land there as `{"no_headers": [...]}`. The csv reader has no
//! field-width limit, so pathologically long fields are read as-is.

use std::collections::HashSet;
use std::io::Cursor;

use csv::{ReaderBuilder, StringRecord};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use super::row::{DecodedRow, is_synthetic};
use super::text::decode_text;
use super::{DecodeOptions, DecodedStream, FileFormat, Member, RecordDecoder, validate_columns};
use crate::error::DecodeError;

/// Key for values beyond the header width.
pub const NO_HEADERS: &str = "no_headers";

/// Decoder for delimited text.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedDecoder {
    delimiter: u8,
}

impl DelimitedDecoder {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for DelimitedDecoder {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl RecordDecoder for DelimitedDecoder {
    fn format(&self) -> FileFormat {
        FileFormat::Delimited
    }

    fn decode(&self, member: Member, options: &DecodeOptions) -> Result<DecodedStream, DecodeError> {
        let text = decode_text(&member.data, options.encoding);
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(Cursor::new(text.into_bytes()));

        let path = member.path;
        let warn_path = path.clone();
        let mut records = reader.into_records().map_while(move |result| match result {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %warn_path, error = %e, "Stopping at unreadable CSV record");
                None
            }
        });

        let Some(header) = records.by_ref().find(|r| !is_blank(r)) else {
            return Ok(DecodedStream::new(
                FileFormat::Delimited,
                path,
                Vec::new(),
                std::iter::empty(),
            ));
        };

        let layout = HeaderLayout::new(&header, options.known_fields.as_ref(), &path);
        let headers = layout.field_names();
        validate_columns(&path, &headers, options)?;

        let rows = records
            .filter(|r| !is_blank(r))
            .map(move |record| layout.row(&record));
        Ok(DecodedStream::new(FileFormat::Delimited, path, headers, rows))
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.is_empty() || (record.len() == 1 && record[0].is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Field(String),
    Extra(String),
}

/// Where each column index goes.
#[derive(Debug, Clone)]
struct HeaderLayout {
    columns: Vec<Column>,
}

impl HeaderLayout {
    fn new(header: &StringRecord, known: Option<&HashSet<String>>, path: &str) -> Self {
        let mut seen = HashSet::new();
        let columns = header
            .iter()
            .map(|name| {
                let name = name.to_string();
                if !seen.insert(name.clone()) {
                    return Column::Extra(name);
                }
                match known {
                    Some(known) if !known.contains(&name) && !is_synthetic(&name) => {
                        warn!(path, column = %name, "Column is not in the catalog; routing it to _sdc_extra");
                        Column::Extra(name)
                    }
                    _ => Column::Field(name),
                }
            })
            .collect();
        Self { columns }
    }

    /// Unique column names, known or not, in header order.
    fn field_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .map(|c| match c {
                Column::Field(n) | Column::Extra(n) => n,
            })
            .filter(|n| seen.insert(n.as_str()))
            .cloned()
            .collect()
    }

    fn row(&self, record: &StringRecord) -> DecodedRow {
        let mut fields = IndexMap::with_capacity(self.columns.len());
        let mut grouped: IndexMap<&str, Vec<Value>> = IndexMap::new();
        let mut overflow = Vec::new();

        for (index, value) in record.iter().enumerate() {
            let value = Value::String(value.to_string());
            match self.columns.get(index) {
                Some(Column::Field(name)) => {
                    fields.insert(name.clone(), value);
                }
                Some(Column::Extra(name)) => grouped.entry(name.as_str()).or_default().push(value),
                None => overflow.push(value),
            }
        }

        let mut extras = Vec::new();
        if !overflow.is_empty() {
            extras.push(single_entry(NO_HEADERS, Value::Array(overflow)));
        }
        for (name, mut values) in grouped {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            extras.push(single_entry(name, value));
        }

        DecodedRow { fields, extras }
    }
}

fn single_entry(key: &str, value: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(key.to_string(), value);
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSpec;
    use serde_json::json;

    fn decode_csv(data: &str, options: &DecodeOptions) -> Result<DecodedStream, DecodeError> {
        DelimitedDecoder::new(options.delimiter).decode(
            Member::new("/exports/a.csv", data.as_bytes().to_vec()),
            options,
        )
    }

    fn options() -> DecodeOptions {
        DecodeOptions::for_table(&TableSpec::new("t", "/", ".*"), "utf-8").unwrap()
    }

    #[test]
    fn test_duplicate_header_goes_to_extra() {
        let rows: Vec<_> = decode_csv("id,name,name\n1,x,y\n", &options()).unwrap().collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].fields,
            IndexMap::from([("id".to_string(), json!("1")), ("name".to_string(), json!("x"))])
        );
        assert_eq!(rows[0].extras, vec![json!({"name": "y"})]);
    }

    #[test]
    fn test_repeated_duplicates_are_collected() {
        let rows: Vec<_> = decode_csv("id,tag,tag,tag\n1,a,b,c\n", &options())
            .unwrap()
            .collect();
        assert_eq!(rows[0].extras, vec![json!({"tag": ["b", "c"]})]);
    }

    #[test]
    fn test_overflow_values_without_headers() {
        let stream = decode_csv("id,name\n1,x,extra1,extra2\n", &options()).unwrap();
        assert_eq!(stream.headers, vec!["id", "name"]);

        let rows: Vec<_> = stream.collect();
        assert_eq!(rows[0].fields.len(), 2);
        assert_eq!(rows[0].extras, vec![json!({"no_headers": ["extra1", "extra2"]})]);
    }

    #[test]
    fn test_short_rows_keep_present_columns() {
        let rows: Vec<_> = decode_csv("id,name,age\n1,x\n", &options()).unwrap().collect();
        assert_eq!(rows[0].fields.len(), 2);
        assert!(rows[0].extras.is_empty());
    }

    #[test]
    fn test_blank_lines_and_nul_bytes() {
        let rows: Vec<_> = decode_csv("id,name\n\n1,a\u{0}b\n\n2,c\n", &options())
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields["name"], json!("ab"));
    }

    #[test]
    fn test_unknown_columns_routed_when_catalog_known() {
        let known = HashSet::from(["id".to_string()]);
        let options = options().with_known_fields(known);

        let rows: Vec<_> = decode_csv("id,surprise\n1,boo\n", &options).unwrap().collect();
        assert_eq!(rows[0].fields.keys().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(rows[0].extras, vec![json!({"surprise": "boo"})]);
    }

    #[test]
    fn test_header_only_file_has_headers_and_no_rows() {
        let mut stream = decode_csv("id,name\n", &options()).unwrap();
        assert_eq!(stream.headers, vec!["id", "name"]);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_empty_file_has_no_headers() {
        let stream = decode_csv("", &options()).unwrap();
        assert!(stream.headers.is_empty());
    }

    #[test]
    fn test_missing_key_properties() {
        let table = TableSpec::new("t", "/", ".*").with_key_properties(["id", "uuid"]);
        let options = DecodeOptions::for_table(&table, "utf-8").unwrap();

        let err = decode_csv("id,name\n1,x\n", &options).unwrap_err();
        assert_eq!(err.to_string(), "CSV file missing required headers: {'uuid'}");
    }

    #[test]
    fn test_custom_delimiter_and_quoting() {
        let table = TableSpec::new("t", "/", ".*").with_delimiter("|");
        let options = DecodeOptions::for_table(&table, "utf-8").unwrap();

        let rows: Vec<_> = decode_csv("id|note\n1|\"a|b\"\n", &options).unwrap().collect();
        assert_eq!(rows[0].fields["note"], json!("a|b"));
    }
}

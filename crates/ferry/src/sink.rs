//! Record output.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Map, Value};

/// One line of output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message<'a> {
    Schema {
        stream: &'a str,
        schema: &'a Value,
        key_properties: &'a [String],
    },
    Record {
        stream: &'a str,
        record: &'a Map<String, Value>,
    },
}

/// Receives schemas and records as a table is synced.
pub trait RecordSink: Send {
    fn write_schema(&mut self, stream: &str, schema: &Value, key_properties: &[String]) -> io::Result<()>;

    fn write_record(&mut self, stream: &str, record: Map<String, Value>) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes each message as a JSON object on its own line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_message(&mut self, message: &Message<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")
    }
}

impl JsonLinesSink<io::BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Self::new(io::BufWriter::new(io::stdout()))
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_schema(&mut self, stream: &str, schema: &Value, key_properties: &[String]) -> io::Result<()> {
        self.write_message(&Message::Schema {
            stream,
            schema,
            key_properties,
        })
    }

    fn write_record(&mut self, stream: &str, record: Map<String, Value>) -> io::Result<()> {
        self.write_message(&Message::Record {
            stream,
            record: &record,
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub schemas: Vec<(String, Value)>,
    pub records: Vec<(String, Map<String, Value>)>,
}

impl MemorySink {
    pub fn records_for<'a>(&'a self, stream: &'a str) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
        self.records
            .iter()
            .filter(move |(s, _)| s == stream)
            .map(|(_, r)| r)
    }
}

impl RecordSink for MemorySink {
    fn write_schema(&mut self, stream: &str, schema: &Value, _key_properties: &[String]) -> io::Result<()> {
        self.schemas.push((stream.to_string(), schema.clone()));
        Ok(())
    }

    fn write_record(&mut self, stream: &str, record: Map<String, Value>) -> io::Result<()> {
        self.records.push((stream.to_string(), record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_lines_output() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_schema("orders", &json!({"type": "object"}), &["id".to_string()])
            .unwrap();
        let record = json!({"id": "1"}).as_object().cloned().unwrap();
        sink.write_record("orders", record).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(
            lines,
            vec![
                json!({"type": "SCHEMA", "stream": "orders", "schema": {"type": "object"}, "key_properties": ["id"]}),
                json!({"type": "RECORD", "stream": "orders", "record": {"id": "1"}}),
            ]
        );
    }
}

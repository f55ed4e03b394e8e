//! Format-aware decoding.
//!
//! `bytes → members → rows`: [`compression`] unpacks a file into members,
//! the member's extension selects a [`RecordDecoder`], and the decoder
//! yields a forward-only [`DecodedStream`] of rows. A stream cannot be
//! restarted; reopen the file to read it again.

pub mod compression;
pub mod delimited;
pub mod jsonl;
pub mod row;
pub mod text;

pub use compression::Member;
pub use delimited::DelimitedDecoder;
pub use jsonl::JsonLinesDecoder;
pub use row::{DecodedRow, SDC_EXTRA, SDC_SOURCE_FILE, SDC_SOURCE_LINENO};

use std::collections::HashSet;
use std::fmt;

use encoding_rs::Encoding;
use ferry_core::emit;
use ferry_core::metrics::events::{FileSkipped, SkipReason};
use tracing::info;

use crate::config::TableSpec;
use crate::error::{ConfigError, DecodeError};

/// Row formats a member can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited,
    JsonLines,
}

impl FileFormat {
    /// Format for a (decompressed) member name, by extension.
    pub fn for_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "txt" | "tsv" => Some(FileFormat::Delimited),
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Delimited => "csv",
            FileFormat::JsonLines => "jsonl",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a decoder needs besides the bytes.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub key_properties: Vec<String>,
    pub date_overrides: Vec<String>,
    /// Fields of the published schema. Delimited columns outside this set
    /// are routed to `_sdc_extra`. `None` keeps every column.
    pub known_fields: Option<HashSet<String>>,
}

impl DecodeOptions {
    /// Options for `table` decoded with the encoding labelled `encoding`.
    pub fn for_table(table: &TableSpec, encoding: &str) -> Result<Self, ConfigError> {
        let resolved = text::resolve_encoding(encoding).ok_or_else(|| ConfigError::UnknownEncoding {
            encoding: encoding.to_string(),
        })?;
        Ok(Self {
            delimiter: table.delimiter_byte().unwrap_or(b','),
            encoding: resolved,
            key_properties: table.key_properties.clone(),
            date_overrides: table.date_overrides.clone(),
            known_fields: None,
        })
    }

    pub fn with_known_fields(mut self, known: HashSet<String>) -> Self {
        self.known_fields = Some(known);
        self
    }
}

/// Strategy for one row format.
pub trait RecordDecoder: Send + Sync {
    fn format(&self) -> FileFormat;

    /// Decode a member into a row stream, validating required columns.
    fn decode(&self, member: Member, options: &DecodeOptions) -> Result<DecodedStream, DecodeError>;
}

/// Decoder for `format`, configured from `options`.
pub fn decoder_for(format: FileFormat, options: &DecodeOptions) -> Box<dyn RecordDecoder> {
    match format {
        FileFormat::Delimited => Box::new(DelimitedDecoder::new(options.delimiter)),
        FileFormat::JsonLines => Box::new(JsonLinesDecoder),
    }
}

/// Rows decoded from one member.
pub struct DecodedStream {
    pub format: FileFormat,
    /// Display path of the member.
    pub path: String,
    /// Column names (delimited) or keys seen (JSON lines), in first-seen order.
    pub headers: Vec<String>,
    rows: Box<dyn Iterator<Item = DecodedRow> + Send>,
}

impl DecodedStream {
    pub fn new(
        format: FileFormat,
        path: String,
        headers: Vec<String>,
        rows: impl Iterator<Item = DecodedRow> + Send + 'static,
    ) -> Self {
        Self {
            format,
            path,
            headers,
            rows: Box::new(rows),
        }
    }
}

impl Iterator for DecodedStream {
    type Item = DecodedRow;

    fn next(&mut self) -> Option<DecodedRow> {
        self.rows.next()
    }
}

impl fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedStream")
            .field("format", &self.format)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Decode a whole remote file into one stream per member.
///
/// Members with an unrecognised extension are skipped.
pub fn decode_file(path: &str, data: Vec<u8>, options: &DecodeOptions) -> Result<Vec<DecodedStream>, DecodeError> {
    let members = compression::expand(Member::new(path, data))?;

    let mut streams = Vec::with_capacity(members.len());
    for member in members {
        let Some(format) = FileFormat::for_name(&member.name) else {
            info!(path = %member.path, "Skipping {} file as its format is not supported.", member.path);
            emit!(FileSkipped {
                reason: SkipReason::UnknownFormat
            });
            continue;
        };
        streams.push(decoder_for(format, options).decode(member, options)?);
    }
    Ok(streams)
}

/// Fail when a declared key or date column was never observed.
pub(crate) fn validate_columns(path: &str, observed: &[String], options: &DecodeOptions) -> Result<(), DecodeError> {
    let missing = |declared: &[String]| -> Vec<String> {
        declared
            .iter()
            .filter(|name| !observed.contains(*name))
            .cloned()
            .collect()
    };

    let missing_keys = missing(&options.key_properties);
    if !missing_keys.is_empty() {
        return Err(DecodeError::MissingKeyProperties {
            path: path.to_string(),
            missing: missing_keys,
        });
    }

    let missing_dates = missing(&options.date_overrides);
    if !missing_dates.is_empty() {
        return Err(DecodeError::MissingDateOverrides {
            path: path.to_string(),
            missing: missing_dates,
        });
    }

    Ok(())
}

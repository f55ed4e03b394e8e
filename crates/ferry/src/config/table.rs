//! Per-table configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use ferry_core::config::RequestTimeout;

use crate::decode::text::resolve_encoding;
use crate::error::{ConfigError, InvalidPatternSnafu};

/// One logical output stream: where its files live and how to type them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub table_name: String,
    /// Directory the recursive listing starts from.
    #[serde(default)]
    pub search_prefix: String,
    /// Regex searched (unanchored) in each full file path.
    pub search_pattern: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Fields always typed as date-time.
    #[serde(default)]
    pub date_overrides: Vec<String>,
    /// Overrides the global encoding for this table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    /// Overrides the global request timeout for this table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<RequestTimeout>,
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl TableSpec {
    /// Minimal spec for a table; everything else takes its default.
    pub fn new(
        table_name: impl Into<String>,
        search_prefix: impl Into<String>,
        search_pattern: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            search_prefix: search_prefix.into(),
            search_pattern: search_pattern.into(),
            delimiter: default_delimiter(),
            key_properties: Vec::new(),
            date_overrides: Vec::new(),
            encoding_format: None,
            request_timeout: None,
        }
    }

    pub fn with_key_properties<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_properties = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_overrides<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_overrides = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding_format = Some(encoding.into());
        self
    }

    pub fn pattern(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.search_pattern)
    }

    /// The delimiter as the single byte the CSV reader wants.
    ///
    /// `\t` written literally in YAML is accepted for tab.
    pub fn delimiter_byte(&self) -> Option<u8> {
        match self.delimiter.as_str() {
            "\\t" => Some(b'\t'),
            d if d.len() == 1 => d.bytes().next(),
            _ => None,
        }
    }

    /// Encoding label for this table, falling back to `default`.
    pub fn encoding<'a>(&'a self, default: &'a str) -> &'a str {
        self.encoding_format.as_deref().unwrap_or(default)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.pattern().context(InvalidPatternSnafu {
            table: self.table_name.clone(),
        })?;

        if self.delimiter_byte().is_none() {
            return Err(ConfigError::InvalidDelimiter {
                table: self.table_name.clone(),
                delimiter: self.delimiter.clone(),
            });
        }

        if let Some(encoding) = &self.encoding_format {
            if resolve_encoding(encoding).is_none() {
                return Err(ConfigError::UnknownEncoding {
                    encoding: encoding.clone(),
                });
            }
        }

        Ok(())
    }
}

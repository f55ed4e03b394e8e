//! Configuration for a ferry run.
//!
//! Loaded from YAML after environment interpolation, then validated as a
//! whole so every table problem surfaces before any remote call.

mod table;

pub use table::TableSpec;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::warn;

use ferry_core::config::{RequestTimeout, interpolate};
use ferry_core::transport::{Connector, Credentials, connector_for_url};
use ferry_core::{Session, TransportError};

use crate::decode::text::resolve_encoding;
use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Default text encoding: UTF-8 with any byte-order mark stripped.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Where files live and how to authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// `file:///srv/exports` for a local directory, or any URL
    /// `object_store` understands (`s3://bucket/prefix`, `gs://...`).
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<String>,
    /// Options forwarded to the object store builder (region, keys, ...).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            private_key_file: self.private_key_file.clone(),
        }
    }

    pub fn connector(&self) -> Result<Arc<dyn Connector>, TransportError> {
        connector_for_url(&self.url, &self.storage_options)
    }
}

/// Bounds on the rows read during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    /// Keep every n-th row.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: usize,
    /// Rows kept per file.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Files sampled per table, newest first.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_sample_rate() -> usize {
    1
}

fn default_max_records() -> usize {
    1000
}

fn default_max_files() -> usize {
    5
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            max_records: default_max_records(),
            max_files: default_max_files(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub connection: ConnectionConfig,
    /// Low-water mark for tables without a bookmark.
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub request_timeout: RequestTimeout,
    #[serde(default = "default_encoding")]
    pub encoding_format: String,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub tables: Vec<TableSpec>,
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let text = interpolate(contents).map_err(|errors| ConfigError::EnvInterpolation {
            message: errors.join("\n"),
        })?;

        let config: Config = serde_yaml::from_str(&text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::NoTables);
        }

        if resolve_encoding(&self.encoding_format).is_none() {
            return Err(ConfigError::UnknownEncoding {
                encoding: self.encoding_format.clone(),
            });
        }

        for (field, value) in [
            ("sample_rate", self.sampling.sample_rate),
            ("max_records", self.sampling.max_records),
            ("max_files", self.sampling.max_files),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidSampling { field });
            }
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.table_name.as_str()) {
                warn!(
                    table = %table.table_name,
                    "Multiple tables share this name; the stream will be skipped during sync"
                );
            }
        }

        Ok(())
    }

    /// Encoding label a table decodes with.
    pub fn encoding_for<'a>(&'a self, table: &'a TableSpec) -> &'a str {
        table.encoding(&self.encoding_format)
    }

    pub fn request_timeout_for(&self, table: &TableSpec) -> RequestTimeout {
        table.request_timeout.unwrap_or(self.request_timeout)
    }

    /// A fresh, unconnected session for `table`.
    pub fn session_for(&self, table: &TableSpec) -> Result<Session, TransportError> {
        let connector = self.connection.connector()?;
        Ok(Session::new(connector, self.connection.credentials())
            .with_request_timeout(self.request_timeout_for(table).duration()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL: &str = r#"
connection:
  url: "file:///srv/exports"
start_date: "2024-01-01T00:00:00Z"
tables:
  - table_name: orders
    search_prefix: /orders
    search_pattern: 'orders.*\.csv'
    key_properties: [id]
"#;

    #[test]
    fn test_parse_minimal() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.encoding_format, "utf-8");
        assert_eq!(config.sampling, SamplingConfig::default());
        assert_eq!(config.request_timeout.duration(), Duration::from_secs(300));
        assert_eq!(config.start_date.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_table_overrides() {
        let yaml = r#"
connection:
  url: "file:///srv/exports"
start_date: "2024-01-01T00:00:00Z"
request_timeout: "100"
encoding_format: latin1
tables:
  - table_name: a
    search_pattern: '.*'
    request_timeout: 5
    encoding_format: utf-16le
  - table_name: b
    search_pattern: '.*'
"#;
        let config = Config::parse(yaml).unwrap();
        let (a, b) = (&config.tables[0], &config.tables[1]);

        assert_eq!(config.request_timeout_for(a).duration(), Duration::from_secs(5));
        assert_eq!(config.request_timeout_for(b).duration(), Duration::from_secs(100));
        assert_eq!(config.encoding_for(a), "utf-16le");
        assert_eq!(config.encoding_for(b), "latin1");
    }

    #[test]
    fn test_no_tables_rejected() {
        let yaml = r#"
connection:
  url: "file:///srv"
start_date: "2024-01-01T00:00:00Z"
tables: []
"#;
        assert!(matches!(Config::parse(yaml), Err(ConfigError::NoTables)));
    }

    #[test]
    fn test_unknown_global_encoding_rejected() {
        let yaml = MINIMAL.replace(
            "start_date:",
            "encoding_format: not-a-codec\nstart_date:",
        );
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn test_zero_sampling_rejected() {
        let yaml = MINIMAL.replace(
            "start_date:",
            "sampling:\n  max_files: 0\nstart_date:",
        );
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::InvalidSampling { field: "max_files" })
        ));
    }

    #[test]
    fn test_missing_env_var_reported() {
        let yaml = MINIMAL.replace("file:///srv/exports", "${FERRY_TEST_UNSET_URL_VAR}");
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::EnvInterpolation { .. })
        ));
    }
}

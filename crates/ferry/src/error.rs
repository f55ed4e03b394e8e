//! Engine error types.
//!
//! Each error reports an [`ErrorKind`]: recoverable errors skip a file,
//! fatal ones abort the table they occurred in.

use snafu::prelude::*;

pub use ferry_core::error::{ErrorKind, TransportError};

// ============ Config Errors ============

/// Errors raised while loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("At least one table must be configured"))]
    NoTables,

    #[snafu(display("Table '{table}' has an invalid search_pattern: {source}"))]
    InvalidPattern { table: String, source: regex::Error },

    #[snafu(display("Table '{table}' delimiter must be a single byte, got '{delimiter}'"))]
    InvalidDelimiter { table: String, delimiter: String },

    #[snafu(display("Unknown Encoding - {encoding}. Enter the valid encoding format"))]
    UnknownEncoding { encoding: String },

    #[snafu(display("sampling.{field} must be greater than zero"))]
    InvalidSampling { field: &'static str },
}

// ============ Catalog Errors ============

/// Errors raised while enumerating remote files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    #[snafu(display("Directory '{prefix}' does not exist"))]
    MissingDirectory { prefix: String },

    #[snafu(display("Listing '{path}' failed: {source}"))]
    Listing {
        path: String,
        source: TransportError,
    },

    #[snafu(display("Invalid search_pattern '{pattern}': {source}"))]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

impl CatalogError {
    /// Catalog failures always abort the table; nothing can be synced
    /// without a file list.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

// ============ Decode Errors ============

/// Errors raised while decompressing or parsing a file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("{path}: {format} files are not supported"))]
    NotImplemented { path: String, format: &'static str },

    #[snafu(display("Skipping {path} file because it is not a zipped file: {source}"))]
    BadZip {
        path: String,
        source: zip::result::ZipError,
    },

    #[snafu(display("Skipping {path} file because it is not a valid gzip file: {source}"))]
    BadGzip {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("CSV file missing required headers: {}", format_set(missing)))]
    MissingKeyProperties { path: String, missing: Vec<String> },

    #[snafu(display("CSV file missing date_overrides headers: {}", format_set(missing)))]
    MissingDateOverrides { path: String, missing: Vec<String> },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::BadZip { .. } | DecodeError::BadGzip { .. } => ErrorKind::Recoverable,
            DecodeError::NotImplemented { .. }
            | DecodeError::MissingKeyProperties { .. }
            | DecodeError::MissingDateOverrides { .. } => ErrorKind::Fatal,
        }
    }
}

fn format_set(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("{{{}}}", quoted.join(", "))
}

// ============ Discovery Errors ============

/// Errors raised while discovering streams.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DiscoveryError {
    #[snafu(display("No streams found"))]
    NoStreams,

    #[snafu(display("Failed to connect: {source}"))]
    Connect { source: TransportError },

    #[snafu(display("Table '{table}': {source}"))]
    DiscoveryCatalog { table: String, source: CatalogError },

    #[snafu(display("Table '{table}', file '{path}': {source}"))]
    DiscoveryDecode {
        table: String,
        path: String,
        source: DecodeError,
    },

    #[snafu(display("Table '{table}', file '{path}': {source}"))]
    DiscoveryOpen {
        table: String,
        path: String,
        source: TransportError,
    },

    #[snafu(display("Table '{table}': {source}"))]
    DiscoveryConfig { table: String, source: ConfigError },
}

// ============ State Errors ============

/// Errors raised while loading or persisting bookmarks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StateError {
    #[snafu(display("Failed to read state file '{path}': {source}"))]
    ReadState {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write state file '{path}': {source}"))]
    WriteState {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to serialize state: {source}"))]
    SerializeState { source: serde_json::Error },
}

// ============ Sync Errors ============

/// Errors that abort a table's sync.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    #[snafu(display("Failed to load state: {source}"))]
    LoadState { source: StateError },

    #[snafu(display("Table '{table}': failed to connect: {source}"))]
    SyncConnect {
        table: String,
        source: TransportError,
    },

    #[snafu(display("Table '{table}': {source}"))]
    SyncCatalog { table: String, source: CatalogError },

    #[snafu(display("Table '{table}', file '{path}': {source}"))]
    SyncOpen {
        table: String,
        path: String,
        source: TransportError,
    },

    #[snafu(display("Table '{table}', file '{path}': {source}"))]
    SyncDecode {
        table: String,
        path: String,
        source: DecodeError,
    },

    #[snafu(display("Table '{table}': {source}"))]
    SyncConfig { table: String, source: ConfigError },

    #[snafu(display("Table '{table}': failed to persist checkpoint: {source}"))]
    Checkpoint { table: String, source: StateError },

    #[snafu(display("Failed to write to sink: {source}"))]
    Sink { source: std::io::Error },

    #[snafu(display("{failed} table(s) failed to sync"))]
    TablesFailed { failed: usize },
}

impl SyncError {
    /// Name of the table the error aborted, if it belongs to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::SyncConnect { table, .. }
            | SyncError::SyncCatalog { table, .. }
            | SyncError::SyncOpen { table, .. }
            | SyncError::SyncDecode { table, .. }
            | SyncError::SyncConfig { table, .. }
            | SyncError::Checkpoint { table, .. } => Some(table),
            SyncError::LoadState { .. } | SyncError::Sink { .. } | SyncError::TablesFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_headers_message() {
        let err = DecodeError::MissingKeyProperties {
            path: "/exports/a.csv".to_string(),
            missing: vec!["id".to_string()],
        };
        assert_eq!(err.to_string(), "CSV file missing required headers: {'id'}");
        assert!(err.kind().is_fatal());
    }

    #[test]
    fn test_missing_directory_message() {
        let err = CatalogError::MissingDirectory {
            prefix: "/exports/missing".to_string(),
        };
        assert_eq!(err.to_string(), "Directory '/exports/missing' does not exist");
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_corrupt_archives_are_recoverable() {
        let err = DecodeError::BadGzip {
            path: "a.csv.gz".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"),
        };
        assert_eq!(err.kind(), ErrorKind::Recoverable);
    }
}

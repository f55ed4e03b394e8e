//! ferry: discover and incrementally extract delimited and JSON-lines files
//! from a remote file server.
//!
//! - [`catalog`] lists and filters remote files
//! - [`decode`] unpacks gzip/zip and parses CSV and JSON lines
//! - [`schema`] samples rows and infers a JSON schema per table
//! - [`sync`] replicates files newer than each table's bookmark

pub mod catalog;
pub mod cli;
pub mod config;
pub mod decode;
pub mod discover;
pub mod error;
pub mod schema;
pub mod sink;
pub mod state;
pub mod sync;

pub use cli::CliArgs;
pub use config::{Config, TableSpec};
pub use discover::{DiscoveredStream, StreamCatalog, discover_streams};
pub use error::{ErrorKind, SyncError};
pub use ferry_core::tracing::init_tracing;
pub use sync::{SyncSummary, Syncer, sync_all};

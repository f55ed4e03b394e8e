//! Incremental sync.
//!
//! Per table: `Idle → Listing → Extracting ⇄ Checkpointing → Done`. Files
//! newer than the table's bookmark are processed strictly in ascending
//! modification order, one at a time. The bookmark is persisted after each
//! file, so an interrupted run re-processes at most the file in flight.
//!
//! A file that cannot be opened or decoded is skipped and still moves the
//! bookmark. A fatal error aborts the table and leaves the last persisted
//! bookmark in place; the remaining tables still run.

pub mod summary;

pub use summary::{FileStats, SyncSummary, TableStats};

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use ferry_core::emit;
use ferry_core::metrics::events::{CheckpointSaved, FileSkipped, RecordsEmitted, SkipReason};
use ferry_core::{ErrorKind, OpenPurpose, Session};
use snafu::ResultExt;
use tracing::{debug, error, info, warn};

use crate::catalog::{RemoteFile, get_files, report_unreadable};
use crate::config::{Config, TableSpec};
use crate::decode::{DecodeOptions, FileFormat, decode_file};
use crate::discover::{DiscoveredStream, StreamCatalog};
use crate::error::{
    CheckpointSnafu, LoadStateSnafu, SinkSnafu, SyncCatalogSnafu, SyncConfigSnafu, SyncError,
};
use crate::sink::RecordSink;
use crate::state::{StateStore, SyncState};

/// Line number of the first data row: one for the header, one for 1-based counting.
const FIRST_DATA_LINENO: u64 = 2;

/// Where a table's sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Listing,
    Extracting,
    Checkpointing,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Listing => "listing",
            SyncPhase::Extracting => "extracting",
            SyncPhase::Checkpointing => "checkpointing",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives the sync of one or more tables against a state store and sink.
pub struct Syncer<'a> {
    config: &'a Config,
    store: &'a dyn StateStore,
    sink: &'a mut dyn RecordSink,
    state: SyncState,
    summary: SyncSummary,
    phase: SyncPhase,
}

impl<'a> Syncer<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn StateStore,
        sink: &'a mut dyn RecordSink,
        state: SyncState,
    ) -> Self {
        Self {
            config,
            store,
            sink,
            state,
            summary: SyncSummary::new(),
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn summary(&self) -> &SyncSummary {
        &self.summary
    }

    pub fn into_parts(self) -> (SyncState, SyncSummary) {
        (self.state, self.summary)
    }

    fn enter(&mut self, table: &str, next: SyncPhase) {
        debug!(table, from = %self.phase, to = %next, "Sync phase");
        self.phase = next;
    }

    /// Open a session for `table`, sync it, and close the session.
    pub async fn run_table(&mut self, table: &TableSpec, stream: &DiscoveredStream) -> Result<u64, SyncError> {
        let mut session = self
            .config
            .session_for(table)
            .map_err(|source| SyncError::SyncConnect {
                table: table.table_name.clone(),
                source,
            })?;
        if let Err(source) = session.ensure_connected().await {
            return Err(SyncError::SyncConnect {
                table: table.table_name.clone(),
                source,
            });
        }

        let result = self.sync_table(&mut session, table, stream).await;
        session.close().await;
        result
    }

    /// Sync one table over `session`. Returns the number of records emitted.
    pub async fn sync_table(
        &mut self,
        session: &mut Session,
        table: &TableSpec,
        stream: &DiscoveredStream,
    ) -> Result<u64, SyncError> {
        let name = table.table_name.as_str();
        self.phase = SyncPhase::Idle;
        match self.sync_files(session, table, stream).await {
            Ok(rows) => {
                self.enter(name, SyncPhase::Done);
                Ok(rows)
            }
            Err(e) => {
                self.enter(name, SyncPhase::Failed);
                Err(e)
            }
        }
    }

    async fn sync_files(
        &mut self,
        session: &mut Session,
        table: &TableSpec,
        stream: &DiscoveredStream,
    ) -> Result<u64, SyncError> {
        let name = table.table_name.as_str();
        let watermark = self.state.bookmark(name).unwrap_or(self.config.start_date);
        info!(table = name, modified_since = %watermark.to_rfc3339(), "Syncing table");

        self.summary
            .start_table(name, &table.search_prefix, &table.search_pattern);
        self.sink
            .write_schema(name, &stream.schema, &stream.key_properties)
            .context(SinkSnafu)?;

        let known = stream.property_names();
        let mut options = DecodeOptions::for_table(table, self.config.encoding_for(table))
            .context(SyncConfigSnafu { table: name })?;
        if !known.is_empty() {
            options = options.with_known_fields(known.clone());
        }

        self.enter(name, SyncPhase::Listing);
        let files = get_files(session, table, Some(watermark))
            .await
            .context(SyncCatalogSnafu { table: name })?;

        let mut total = 0;
        for file in &files {
            self.enter(name, SyncPhase::Extracting);
            match self.extract_file(session, table, file, &options, &known).await? {
                Some(rows) => {
                    total += rows;
                    self.summary
                        .record_file(name, &file.filepath, rows, file.last_modified);
                }
                None => self.summary.record_skip(name),
            }

            self.enter(name, SyncPhase::Checkpointing);
            self.checkpoint(name, file.last_modified).await?;
        }

        info!(table = name, files = files.len(), records = total, "Finished syncing table");
        Ok(total)
    }

    /// Emit every row of one file. `None` means the file was skipped.
    async fn extract_file(
        &mut self,
        session: &mut Session,
        table: &TableSpec,
        file: &RemoteFile,
        options: &DecodeOptions,
        known: &HashSet<String>,
    ) -> Result<Option<u64>, SyncError> {
        let name = table.table_name.as_str();
        debug!(table = name, path = %file.filepath, "Syncing file");

        let data = match session.open(&file.filepath, OpenPurpose::Extraction).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::Recoverable => {
                report_unreadable(&file.filepath, &e);
                return Ok(None);
            }
            Err(source) => {
                return Err(SyncError::SyncOpen {
                    table: name.to_string(),
                    path: file.filepath.clone(),
                    source,
                });
            }
        };

        let streams = match decode_file(&file.filepath, data.to_vec(), options) {
            Ok(streams) => streams,
            Err(e) if !e.kind().is_fatal() => {
                warn!(table = name, path = %file.filepath, "{e}");
                emit!(FileSkipped {
                    reason: SkipReason::CorruptArchive
                });
                return Ok(None);
            }
            Err(source) => {
                return Err(SyncError::SyncDecode {
                    table: name.to_string(),
                    path: file.filepath.clone(),
                    source,
                });
            }
        };

        let mut rows = 0u64;
        for stream in streams {
            let route_keys = stream.format == FileFormat::JsonLines && !known.is_empty();
            for (index, mut row) in stream.enumerate() {
                if route_keys {
                    row.route_unknown(known);
                }
                let record = row.into_record(&file.filepath, index as u64 + FIRST_DATA_LINENO);
                self.sink.write_record(name, record).context(SinkSnafu)?;
                rows += 1;
            }
        }

        emit!(RecordsEmitted {
            count: rows,
            table: name.to_string(),
        });
        Ok(Some(rows))
    }

    async fn checkpoint(&mut self, table: &str, last_modified: DateTime<Utc>) -> Result<(), SyncError> {
        if !self.state.advance(table, last_modified) {
            return Ok(());
        }
        self.store
            .save(&self.state)
            .await
            .context(CheckpointSnafu { table })?;
        emit!(CheckpointSaved {
            table: table.to_string(),
        });
        debug!(table, modified_since = %last_modified.to_rfc3339(), "Saved checkpoint");
        Ok(())
    }
}

/// Sync every stream in `catalog` that maps to exactly one configured table.
///
/// A table that fails is logged and counted; the others still run. Any
/// failure makes the run return [`SyncError::TablesFailed`] once every
/// table has been attempted.
pub async fn sync_all(
    config: &Config,
    catalog: &StreamCatalog,
    store: &dyn StateStore,
    sink: &mut dyn RecordSink,
) -> Result<SyncSummary, SyncError> {
    let state = store.load().await.context(LoadStateSnafu)?;
    let mut syncer = Syncer::new(config, store, sink, state);
    let mut failed = 0;

    for stream in &catalog.streams {
        let matches: Vec<&TableSpec> = config
            .tables
            .iter()
            .filter(|t| t.table_name == stream.table_name)
            .collect();

        let table = match matches.as_slice() {
            [table] => *table,
            [] => {
                warn!(table = %stream.table_name, "No table configuration found for stream, skipping");
                continue;
            }
            _ => {
                warn!(
                    table = %stream.table_name,
                    matches = matches.len(),
                    "Multiple table configurations found for stream, skipping"
                );
                continue;
            }
        };

        if let Err(e) = syncer.run_table(table, stream).await {
            error!(table = %table.table_name, error = %e, "Table sync failed");
            failed += 1;
        }
    }

    let (_, summary) = syncer.into_parts();
    sink.flush().context(SinkSnafu)?;
    summary.log();

    if failed > 0 {
        return Err(SyncError::TablesFailed { failed });
    }
    Ok(summary)
}

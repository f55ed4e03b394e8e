//! Internal events and the counters they increment.
//!
//! Table-scoped events carry a `table` label.

use metrics::counter;
use tracing::trace;

/// An occurrence worth counting.
pub trait InternalEvent {
    fn emit(self);
}

/// Files that survived listing and filtering for a table.
pub struct FilesListed {
    pub count: u64,
    pub table: String,
}

impl InternalEvent for FilesListed {
    fn emit(self) {
        trace!(count = self.count, table = %self.table, "Files listed");
        counter!("ferry_files_listed_total", "table" => self.table).increment(self.count);
    }
}

/// Why a file contributed no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Permission,
    Unreadable,
    Empty,
    CorruptArchive,
    UnknownFormat,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Permission => "permission",
            SkipReason::Unreadable => "unreadable",
            SkipReason::Empty => "empty",
            SkipReason::CorruptArchive => "corrupt_archive",
            SkipReason::UnknownFormat => "unknown_format",
        }
    }
}

/// A file (or archive member) was skipped.
pub struct FileSkipped {
    pub reason: SkipReason,
}

impl InternalEvent for FileSkipped {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "File skipped");
        counter!("ferry_files_skipped_total", "reason" => self.reason.as_str()).increment(1);
    }
}

/// Records handed to the sink.
pub struct RecordsEmitted {
    pub count: u64,
    pub table: String,
}

impl InternalEvent for RecordsEmitted {
    fn emit(self) {
        trace!(count = self.count, table = %self.table, "Records emitted");
        counter!("ferry_records_emitted_total", "table" => self.table).increment(self.count);
    }
}

/// A transport call is about to be retried.
pub struct RetryAttempted {
    pub call_site: &'static str,
}

impl InternalEvent for RetryAttempted {
    fn emit(self) {
        trace!(call_site = self.call_site, "Retry attempted");
        counter!("ferry_retries_total", "call_site" => self.call_site).increment(1);
    }
}

/// A watermark was persisted.
pub struct CheckpointSaved {
    pub table: String,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(table = %self.table, "Checkpoint saved");
        counter!("ferry_checkpoints_saved_total", "table" => self.table).increment(1);
    }
}

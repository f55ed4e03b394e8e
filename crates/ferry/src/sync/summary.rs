//! Per-run sync statistics.
//!
//! One [`SyncSummary`] is created per run and threaded through every table;
//! nothing is shared between runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Rows emitted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub rows: u64,
    pub last_modified: DateTime<Utc>,
}

/// Everything synced for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub search_prefix: String,
    pub search_pattern: String,
    pub files: BTreeMap<String, FileStats>,
    pub skipped: u64,
}

impl TableStats {
    pub fn rows(&self) -> u64 {
        self.files.values().map(|f| f.rows).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    tables: BTreeMap<String, TableStats>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_table(&mut self, table: &str, search_prefix: &str, search_pattern: &str) {
        let stats = self.tables.entry(table.to_string()).or_default();
        stats.search_prefix = search_prefix.to_string();
        stats.search_pattern = search_pattern.to_string();
    }

    pub fn record_file(&mut self, table: &str, path: &str, rows: u64, last_modified: DateTime<Utc>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .files
            .insert(path.to_string(), FileStats { rows, last_modified });
    }

    pub fn record_skip(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default().skipped += 1;
    }

    pub fn table(&self, table: &str) -> Option<&TableStats> {
        self.tables.get(table)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.values().map(TableStats::rows).sum()
    }

    /// Log every table, its files ordered by modification time.
    pub fn log(&self) {
        for (name, stats) in &self.tables {
            info!(
                table = %name,
                prefix = %stats.search_prefix,
                pattern = %stats.search_pattern,
                files = stats.files.len(),
                skipped = stats.skipped,
                rows = stats.rows(),
                "Sync summary"
            );

            let mut files: Vec<_> = stats.files.iter().collect();
            files.sort_by_key(|(_, f)| f.last_modified);
            for (path, file) in files {
                info!(
                    table = %name,
                    path = %path,
                    rows = file.rows,
                    last_modified = %file.last_modified.to_rfc3339(),
                    "Synced file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_totals() {
        let mut summary = SyncSummary::new();
        summary.start_table("a", "/a", ".*");
        summary.record_file("a", "/a/1.csv", 3, Utc.timestamp_opt(1, 0).unwrap());
        summary.record_file("a", "/a/2.csv", 4, Utc.timestamp_opt(2, 0).unwrap());
        summary.record_skip("a");
        summary.record_file("b", "/b/1.csv", 1, Utc.timestamp_opt(3, 0).unwrap());

        assert_eq!(summary.table("a").unwrap().rows(), 7);
        assert_eq!(summary.table("a").unwrap().skipped, 1);
        assert_eq!(summary.total_rows(), 8);
    }
}

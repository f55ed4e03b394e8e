//! Bounded row sampling for discovery.

use ferry_core::{ErrorKind, OpenPurpose, Session};
use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::catalog::{RemoteFile, report_unreadable};
use crate::config::SamplingConfig;
use crate::decode::{DecodeOptions, DecodedRow, DecodedStream, decode_file};
use crate::error::DiscoveryError;

/// Rows kept from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSample {
    pub rows: Vec<DecodedRow>,
    /// No data rows were found; `rows` holds at most one all-null row
    /// built from the header.
    pub empty: bool,
}

/// Keep every `sample_rate`-th row of each stream, at most `max_records`
/// in total. Extras are dropped; only named fields shape the schema.
/// With no data rows at all, the null row covers the headers of every stream.
pub fn sample_streams(streams: Vec<DecodedStream>, sample_rate: usize, max_records: usize) -> FileSample {
    let sample_rate = sample_rate.max(1);
    let mut rows = Vec::new();
    let mut headers = IndexSet::new();

    'streams: for stream in streams {
        headers.extend(stream.headers.iter().cloned());
        for (index, mut row) in stream.enumerate() {
            if index % sample_rate == 0 {
                row.extras.clear();
                rows.push(row);
            }
            if rows.len() >= max_records {
                break 'streams;
            }
        }
    }

    if rows.is_empty() {
        let rows = if headers.is_empty() {
            Vec::new()
        } else {
            vec![DecodedRow::nulls(&headers)]
        };
        return FileSample { rows, empty: true };
    }

    FileSample { rows, empty: false }
}

/// Sample up to `max_files` of `files`, newest first.
///
/// `files` must be ascending by modification time, as the catalog returns
/// them. When no file has data rows, the header-only null rows are
/// returned instead so column names still reach the schema.
pub async fn sample_files(
    session: &mut Session,
    table: &str,
    files: &[RemoteFile],
    options: &DecodeOptions,
    config: &SamplingConfig,
) -> Result<Vec<DecodedRow>, DiscoveryError> {
    let mut samples = Vec::new();
    let mut empty_samples = Vec::new();

    for file in files.iter().rev().take(config.max_files) {
        let data = match session.open(&file.filepath, OpenPurpose::Sampling).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::Recoverable => {
                report_unreadable(&file.filepath, &e);
                continue;
            }
            Err(source) => {
                return Err(DiscoveryError::DiscoveryOpen {
                    table: table.to_string(),
                    path: file.filepath.clone(),
                    source,
                });
            }
        };

        let streams = match decode_file(&file.filepath, data.to_vec(), options) {
            Ok(streams) => streams,
            Err(e) if !e.kind().is_fatal() => {
                warn!(path = %file.filepath, error = %e, "Skipping file that could not be decoded");
                continue;
            }
            Err(source) => {
                return Err(DiscoveryError::DiscoveryDecode {
                    table: table.to_string(),
                    path: file.filepath.clone(),
                    source,
                });
            }
        };

        let sample = sample_streams(streams, config.sample_rate, config.max_records);
        debug!(
            table,
            path = %file.filepath,
            rows = sample.rows.len(),
            empty = sample.empty,
            "Sampled file"
        );
        if sample.empty {
            empty_samples.extend(sample.rows);
        } else {
            samples.extend(sample.rows);
        }
    }

    Ok(if samples.is_empty() { empty_samples } else { samples })
}

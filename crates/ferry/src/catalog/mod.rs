//! Remote file catalog.
//!
//! Listing walks the tree one directory level per call, depth first, and
//! materialises the whole file list before anything is read. Zero-byte
//! files never enter the catalog.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use ferry_core::emit;
use ferry_core::metrics::events::{FileSkipped, FilesListed, SkipReason};
use ferry_core::{ErrorKind, Session, TransportError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::config::TableSpec;
use crate::error::{CatalogError, ListingSnafu, PatternSnafu};

/// A non-empty file on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Forward-slash separated path, rooted at the search prefix.
    pub filepath: String,
    pub last_modified: DateTime<Utc>,
}

impl RemoteFile {
    pub fn new(filepath: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            filepath: filepath.into(),
            last_modified,
        }
    }
}

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CatalogError>> + 'a>>;

/// Every non-empty file below `prefix`. An empty prefix means `.`.
///
/// A missing `prefix` is fatal. Subdirectories that vanish or deny access
/// mid-walk are skipped with a warning.
pub async fn list_files(session: &mut Session, prefix: &str) -> Result<Vec<RemoteFile>, CatalogError> {
    let root = if prefix.is_empty() { "." } else { prefix };
    let mut files = Vec::new();
    walk(session, root.to_string(), true, &mut files).await?;
    Ok(files)
}

fn walk<'a>(session: &'a mut Session, dir: String, top: bool, out: &'a mut Vec<RemoteFile>) -> WalkFuture<'a> {
    Box::pin(async move {
        let entries = match session.list_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if top && e.is_not_found() => {
                return Err(CatalogError::MissingDirectory { prefix: dir });
            }
            Err(e) if !top && e.kind() == ErrorKind::Recoverable => {
                warn!(path = %dir, error = %e, "Skipping directory that could not be listed");
                return Ok(());
            }
            Err(e) => return Err(e).context(ListingSnafu { path: dir }),
        };

        for entry in entries {
            let path = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
            if entry.is_dir {
                walk(session, path, false, out).await?;
            } else if entry.size == 0 {
                debug!(path = %path, "Skipping empty file");
            } else {
                out.push(RemoteFile::new(path, entry.modified));
            }
        }
        Ok(())
    })
}

/// Keep files whose path contains a match for `pattern`.
pub fn filter_files(files: Vec<RemoteFile>, pattern: &Regex) -> Vec<RemoteFile> {
    files
        .into_iter()
        .filter(|f| pattern.is_match(&f.filepath))
        .collect()
}

/// Files for `table`, strictly newer than `modified_since` when given,
/// sorted ascending by modification time.
pub async fn get_files(
    session: &mut Session,
    table: &TableSpec,
    modified_since: Option<DateTime<Utc>>,
) -> Result<Vec<RemoteFile>, CatalogError> {
    let pattern = table.pattern().context(PatternSnafu {
        pattern: table.search_pattern.clone(),
    })?;

    let listed = list_files(session, &table.search_prefix).await?;
    let total = listed.len();

    let mut files = filter_files(listed, &pattern);
    if let Some(since) = modified_since {
        files.retain(|f| f.last_modified > since);
    }
    files.sort_by_key(|f| f.last_modified);

    info!(
        table = %table.table_name,
        prefix = %table.search_prefix,
        pattern = %table.search_pattern,
        listed = total,
        matched = files.len(),
        "Found files"
    );
    emit!(FilesListed {
        count: files.len() as u64,
        table: table.table_name.clone(),
    });

    Ok(files)
}

/// Log why a file could not be opened and count the skip.
pub(crate) fn report_unreadable(path: &str, error: &TransportError) {
    let reason = if error.is_permission_denied() {
        warn!(path, "Skipping {path} file as you do not have enough permissions.");
        SkipReason::Permission
    } else {
        warn!(path, error = %error, "Skipping {path} file as there is some problem in opening it.");
        SkipReason::Unreadable
    };
    emit!(FileSkipped { reason });
}

//! Bookmark persistence.
//!
//! State is `{table_name: {modified_since}}`, read once per table at sync
//! start and rewritten after every completed file.
//!
//! # Atomic Writes
//!
//! [`JsonFileStateStore`] writes `{path}.tmp` and renames it over `{path}`,
//! so a crash never leaves a partially written state file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::error::{ReadStateSnafu, SerializeStateSnafu, StateError, WriteStateSnafu};

/// Last fully replicated modification time of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub modified_since: DateTime<Utc>,
}

/// Bookmarks of every table, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    bookmarks: BTreeMap<String, Bookmark>,
}

impl SyncState {
    pub fn bookmark(&self, table: &str) -> Option<DateTime<Utc>> {
        self.bookmarks.get(table).map(|b| b.modified_since)
    }

    /// Record `modified_since` for `table`. Returns false, leaving the
    /// state untouched, if that would move the bookmark backwards.
    pub fn advance(&mut self, table: &str, modified_since: DateTime<Utc>) -> bool {
        match self.bookmarks.get(table) {
            Some(current) if current.modified_since > modified_since => false,
            _ => {
                self.bookmarks
                    .insert(table.to_string(), Bookmark { modified_since });
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.bookmarks.keys().map(String::as_str)
    }
}

/// Where bookmarks live between runs.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<SyncState, StateError>;

    async fn save(&self, state: &SyncState) -> Result<(), StateError>;
}

/// State kept in a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    /// A missing file is an empty state; so is one that fails to parse.
    async fn load(&self) -> Result<SyncState, StateError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.display(), "No state file found, starting fresh");
                return Ok(SyncState::default());
            }
            Err(e) => return Err(e).context(ReadStateSnafu { path: self.display() }),
        };

        if contents.trim().is_empty() {
            return Ok(SyncState::default());
        }

        match serde_json::from_str::<SyncState>(&contents) {
            Ok(state) => {
                info!(path = %self.display(), tables = state.bookmarks.len(), "Loaded state");
                Ok(state)
            }
            Err(e) => {
                warn!(path = %self.display(), error = %e, "Failed to parse state JSON, starting fresh");
                Ok(SyncState::default())
            }
        }
    }

    async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state).context(SerializeStateSnafu)?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, json)
            .await
            .context(WriteStateSnafu { path: temp.display().to_string() })?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .context(WriteStateSnafu { path: self.display() })?;
        Ok(())
    }
}

/// In-process state that remembers every save.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    initial: SyncState,
    saves: Mutex<Vec<SyncState>>,
}

impl MemoryStateStore {
    pub fn new(initial: SyncState) -> Self {
        Self {
            initial,
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Every state passed to `save`, oldest first.
    pub fn saves(&self) -> Vec<SyncState> {
        self.saves.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recently saved state, or the initial one.
    pub fn current(&self) -> SyncState {
        self.saves().pop().unwrap_or_else(|| self.initial.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<SyncState, StateError> {
        Ok(self.current())
    }

    async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        Ok(())
    }
}

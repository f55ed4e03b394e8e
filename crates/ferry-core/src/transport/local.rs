//! Local filesystem transport.
//!
//! Remote paths are resolved under a root directory, so `/exports/a.csv`
//! with root `/srv` reads `/srv/exports/a.csv`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Connector, Credentials, DirEntry, Transport, relative_path};
use crate::error::TransportError;

/// Reads files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = relative_path(path);
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, TransportError> {
        let dir = self.resolve(path);
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| TransportError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| TransportError::from_io(path, e))?
        {
            // lstat, like an SFTP directory listing: a symlink is never a directory.
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|e| TransportError::from_io(path, e))?;

            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified,
                is_dir: metadata.is_dir(),
            });
        }

        // read_dir order is platform dependent
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open(&self, path: &str) -> Result<Bytes, TransportError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map(Bytes::from)
            .map_err(|e| TransportError::from_io(path, e))
    }
}

/// Hands out [`LocalTransport`]s for a fixed root. Credentials are ignored.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn Transport>, TransportError> {
        tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| TransportError::from_io(self.root.display().to_string(), e))?;
        Ok(Box::new(LocalTransport::new(self.root.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_dir_reports_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("a.csv"), b"id\n1\n").unwrap();

        let transport = LocalTransport::new(temp.path());
        let entries = transport.list_dir("/").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.csv");
        assert_eq!(entries[0].size, 5);
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "nested");
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_missing_dir_is_not_found() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path());

        let err = transport.list_dir("/missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_open_reads_whole_file() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("exports")).unwrap();
        std::fs::write(temp.path().join("exports/a.jsonl"), b"{\"id\":1}\n").unwrap();

        let transport = LocalTransport::new(temp.path());
        let bytes = transport.open("/exports/a.jsonl").await.unwrap();
        assert_eq!(&bytes[..], b"{\"id\":1}\n");
    }

    #[tokio::test]
    async fn test_connect_fails_for_missing_root() {
        let temp = TempDir::new().unwrap();
        let connector = LocalConnector::new(temp.path().join("gone"));

        let result = connector.connect(&Credentials::default()).await;
        assert!(matches!(result, Err(TransportError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_dir_is_not_walked() {
        let temp = TempDir::new().unwrap();
        let exports = temp.path().join("exports");
        std::fs::create_dir(&exports).unwrap();
        std::fs::write(exports.join("a.csv"), b"id\n1\n").unwrap();
        std::os::unix::fs::symlink(&exports, exports.join("loop")).unwrap();

        let transport = LocalTransport::new(temp.path());
        let entries = transport.list_dir("/exports").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "loop");
        assert!(entries.iter().all(|e| !e.is_dir));
    }
}

//! Object store transport (S3, GCS, Azure, memory).
//!
//! Object stores have no real directories; a listing with no objects and no
//! common prefixes is reported as not found, which matches what a missing
//! directory looks like on a file server.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path;
use snafu::ResultExt;
use url::Url;

use super::{Connector, Credentials, DirEntry, Transport, relative_path};
use crate::error::{ObjectStoreSnafu, TransportError};

/// Transport over any `object_store` backend.
pub struct ObjectStoreTransport {
    store: Arc<dyn ObjectStore>,
    base: Path,
}

impl ObjectStoreTransport {
    pub fn new(store: Arc<dyn ObjectStore>, base: Path) -> Self {
        Self { store, base }
    }

    fn resolve(&self, path: &str) -> Path {
        let relative = relative_path(path);
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.base.clone(), |acc, part| acc.child(part))
    }

    fn map_error(path: &str, source: object_store::Error) -> TransportError {
        match source {
            object_store::Error::NotFound { .. } => TransportError::NotFound {
                path: path.to_string(),
            },
            other => TransportError::ObjectStore { source: other },
        }
    }
}

#[async_trait]
impl Transport for ObjectStoreTransport {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, TransportError> {
        let prefix = self.resolve(path);
        let listing = self
            .store
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|e| Self::map_error(path, e))?;

        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            return Err(TransportError::NotFound {
                path: path.to_string(),
            });
        }

        let dirs = listing.common_prefixes.iter().filter_map(|p| {
            p.filename().map(|name| DirEntry {
                name: name.to_string(),
                size: 0,
                modified: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                is_dir: true,
            })
        });
        let files = listing.objects.iter().filter_map(|meta| {
            meta.location.filename().map(|name| DirEntry {
                name: name.to_string(),
                size: meta.size as u64,
                modified: meta.last_modified,
                is_dir: false,
            })
        });

        Ok(files.chain(dirs).collect())
    }

    async fn open(&self, path: &str) -> Result<Bytes, TransportError> {
        let location = self.resolve(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::map_error(path, e))?;
        result.bytes().await.context(ObjectStoreSnafu)
    }
}

/// Builds an [`ObjectStoreTransport`] from a URL such as `s3://bucket/exports`.
#[derive(Debug, Clone)]
pub struct ObjectStoreConnector {
    url: Url,
    options: HashMap<String, String>,
}

impl ObjectStoreConnector {
    pub fn new(url: Url, options: HashMap<String, String>) -> Self {
        Self { url, options }
    }
}

#[async_trait]
impl Connector for ObjectStoreConnector {
    async fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn Transport>, TransportError> {
        let (store, base) =
            object_store::parse_url_opts(&self.url, self.options.iter()).context(ObjectStoreSnafu)?;
        Ok(Box::new(ObjectStoreTransport::new(Arc::from(store), base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::memory::InMemory;

    async fn create_test_transport() -> ObjectStoreTransport {
        let store = Arc::new(InMemory::new());
        for (path, body) in [
            ("exports/a.csv", "id\n1\n"),
            ("exports/nested/b.csv", "id\n2\n"),
        ] {
            store
                .put(&Path::from(path), PutPayload::from(body.as_bytes().to_vec()))
                .await
                .unwrap();
        }
        ObjectStoreTransport::new(store, Path::default())
    }

    #[tokio::test]
    async fn test_list_dir_splits_files_and_prefixes() {
        let transport = create_test_transport().await;
        let entries = transport.list_dir("/exports").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.csv");
        assert_eq!(entries[0].size, 5);
        assert_eq!(entries[1].name, "nested");
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn test_empty_prefix_is_not_found() {
        let transport = create_test_transport().await;
        let err = transport.list_dir("/missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_open_missing_object_is_not_found() {
        let transport = create_test_transport().await;
        let err = transport.open("/exports/zzz.csv").await.unwrap_err();
        assert!(err.is_not_found());

        let bytes = transport.open("/exports/nested/b.csv").await.unwrap();
        assert_eq!(&bytes[..], b"id\n2\n");
    }
}

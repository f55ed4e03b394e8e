//! Remote file transport contract.
//!
//! A transport lists one directory level at a time and reads whole files.
//! Implementations never retry; retry and timeouts belong to
//! [`Session`](crate::session::Session).

mod local;
mod store;

pub use self::local::{LocalConnector, LocalTransport};
pub use self::store::{ObjectStoreConnector, ObjectStoreTransport};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::TransportError;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, without the parent path.
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// An established connection to a file server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// List the immediate children of `path`.
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, TransportError>;

    /// Read the full contents of the file at `path`.
    async fn open(&self, path: &str) -> Result<Bytes, TransportError>;

    /// Release the connection. The default does nothing.
    async fn close(&self) {}
}

/// Credentials presented when connecting.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_file: Option<String>,
}

impl Credentials {
    /// Same credentials with the private key dropped.
    pub fn without_private_key(&self) -> Self {
        Self {
            private_key_file: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key_file", &self.private_key_file)
            .finish()
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Transport>, TransportError>;
}

/// Pick a connector from a connection URL.
///
/// `file://` URLs read the local filesystem; any other scheme is handed to
/// `object_store` together with `options`.
pub fn connector_for_url(
    url: &str,
    options: &HashMap<String, String>,
) -> Result<Arc<dyn Connector>, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if parsed.scheme() == "file" {
        let root = parsed
            .to_file_path()
            .map_err(|_| TransportError::InvalidUrl {
                url: url.to_string(),
                message: "not an absolute file path".to_string(),
            })?;
        return Ok(Arc::new(LocalConnector::new(root)));
    }

    Ok(Arc::new(ObjectStoreConnector::new(parsed, options.clone())))
}

/// Normalise a remote path to a slash-separated path with no leading or
/// trailing slash. `""`, `"."` and `"/"` all mean the root.
pub(crate) fn relative_path(path: &str) -> &str {
    let trimmed = path.trim_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed == "." { "" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path(""), "");
        assert_eq!(relative_path("."), "");
        assert_eq!(relative_path("/"), "");
        assert_eq!(relative_path("/exports/orders/"), "exports/orders");
        assert_eq!(relative_path("./exports"), "exports");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: Some("ferry".to_string()),
            password: Some("hunter2".to_string()),
            private_key_file: Some("/keys/id_rsa".to_string()),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(creds.without_private_key().private_key_file.is_none());
    }

    #[test]
    fn test_connector_for_url_rejects_garbage() {
        let result = connector_for_url("not a url", &HashMap::new());
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }
}

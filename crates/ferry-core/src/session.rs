//! Session ownership for a remote file server.
//!
//! A [`Session`] holds at most one live transport. It connects on
//! [`ensure_connected`](Session::ensure_connected) and drops the connection
//! on [`close`](Session::close); callers scope one session per table.
//! Every remote call is bounded by the request timeout and wrapped in the
//! retry policy for its call site.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::retry::{RetryPolicy, retry};
use crate::transport::{Connector, Credentials, DirEntry, Transport};

/// Default request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Which retry policy a file open runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPurpose {
    /// Reading rows to infer a schema.
    Sampling,
    /// Reading rows to emit.
    Extraction,
}

impl OpenPurpose {
    fn policy(self) -> RetryPolicy {
        match self {
            OpenPurpose::Sampling => RetryPolicy::sample_open(),
            OpenPurpose::Extraction => RetryPolicy::extract_open(),
        }
    }
}

/// A lazily established connection plus the settings needed to re-establish it.
pub struct Session {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    request_timeout: Duration,
    transport: Option<Box<dyn Transport>>,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials) -> Self {
        Self {
            connector,
            credentials,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Connect if not already connected and return the live transport.
    ///
    /// Dropped connections are retried with exponential backoff. An
    /// authentication failure while a private key is configured is retried
    /// once without the key before giving up.
    pub async fn ensure_connected(&mut self) -> Result<&dyn Transport, TransportError> {
        if self.transport.is_none() {
            let transport = self.connect().await?;
            self.transport = Some(transport);
        }
        self.transport
            .as_deref()
            .ok_or(TransportError::NotConnected)
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self.connect_with(&self.credentials).await {
            Err(e) if e.is_authentication() && self.credentials.private_key_file.is_some() => {
                warn!(error = %e, "Authentication with private key failed, retrying without it");
                let fallback = self.credentials.without_private_key();
                self.connect_with(&fallback).await
            }
            other => other,
        }
    }

    async fn connect_with(&self, credentials: &Credentials) -> Result<Box<dyn Transport>, TransportError> {
        let connector = &self.connector;
        let transport = retry(
            RetryPolicy::session(),
            TransportError::is_connection_dropped,
            || connector.connect(credentials),
        )
        .await?;
        info!("Connection established");
        Ok(transport)
    }

    /// Drop the live connection, if any. The next call reconnects.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
            debug!("Connection closed");
        }
    }

    /// List the immediate children of `path`, retrying timeouts.
    pub async fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, TransportError> {
        let timeout = self.request_timeout;
        let transport = self.ensure_connected().await?;
        retry(RetryPolicy::listing(), TransportError::is_timeout, || {
            bounded(timeout, "list", path, transport.list_dir(path))
        })
        .await
    }

    /// Read a whole file, retrying timeouts under the policy for `purpose`.
    pub async fn open(&mut self, path: &str, purpose: OpenPurpose) -> Result<Bytes, TransportError> {
        let timeout = self.request_timeout;
        let transport = self.ensure_connected().await?;
        retry(purpose.policy(), TransportError::is_timeout, || {
            bounded(timeout, "open", path, transport.open(path))
        })
        .await
    }
}

async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    path: &str,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::TimedOut {
            operation,
            path: path.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

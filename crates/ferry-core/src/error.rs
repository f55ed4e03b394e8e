//! Error types shared by the transport, session and retry layers.
//!
//! Every error answers [`ErrorKind`] so callers decide between skipping a
//! single file and aborting a table without matching on variants.

use snafu::prelude::*;

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Absorbed locally: the file (or line) is skipped and work continues.
    Recoverable,
    /// Aborts the current table; the previous checkpoint stays untouched.
    Fatal,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        self == ErrorKind::Fatal
    }
}

// ============ Transport Errors ============

/// Errors raised by a [`Transport`](crate::transport::Transport) or while
/// establishing a session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// Path does not exist on the remote side.
    #[snafu(display("Path '{path}' not found"))]
    NotFound { path: String },

    /// Caller lacks permission to read the path.
    #[snafu(display("Permission denied for '{path}'"))]
    PermissionDenied { path: String },

    /// Request exceeded the configured request timeout.
    #[snafu(display("Timed out after {seconds}s during {operation} of '{path}'"))]
    TimedOut {
        operation: &'static str,
        path: String,
        seconds: u64,
    },

    /// Connection reset or closed mid-handshake.
    #[snafu(display("Connection closed: {message}"))]
    ConnectionClosed { message: String },

    /// Server rejected the supplied credentials.
    #[snafu(display(
        "Message from SFTP server: {message} - Please ensure that the credentials are valid."
    ))]
    Authentication { message: String },

    /// Connection URL could not be parsed.
    #[snafu(display("Invalid connection URL '{url}': {message}"))]
    InvalidUrl { url: String, message: String },

    /// Other IO failure.
    #[snafu(display("IO error on '{path}': {source}"))]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Object store operation failed.
    #[snafu(display("Object store operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// Operation attempted on a session that was never connected.
    #[snafu(display("Session is not connected"))]
    NotConnected,
}

impl TransportError {
    /// Map an IO error onto the transport taxonomy.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let path = path.into();
        match source.kind() {
            Io::NotFound => TransportError::NotFound { path },
            Io::PermissionDenied => TransportError::PermissionDenied { path },
            Io::TimedOut | Io::WouldBlock => TransportError::TimedOut {
                operation: "read",
                path,
                seconds: 0,
            },
            Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe | Io::UnexpectedEof => {
                TransportError::ConnectionClosed {
                    message: source.to_string(),
                }
            }
            _ => TransportError::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            TransportError::NotFound { .. } => true,
            TransportError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::PermissionDenied { .. })
    }

    /// Socket or read timeout; retried by listing and open policies.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::TimedOut { .. })
    }

    /// Connection reset or handshake EOF; retried by session establishment.
    pub fn is_connection_dropped(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, TransportError::Authentication { .. })
    }

    /// Classification once retries (if any) are exhausted.
    ///
    /// Missing or unreadable files are skipped; anything that says the
    /// server itself is unhealthy aborts the table.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotFound { .. }
            | TransportError::PermissionDenied { .. }
            | TransportError::Io { .. } => ErrorKind::Recoverable,
            TransportError::ObjectStore { .. } if self.is_not_found() => ErrorKind::Recoverable,
            _ => ErrorKind::Fatal,
        }
    }
}

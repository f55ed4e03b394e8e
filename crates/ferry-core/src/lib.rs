//! Plumbing shared by the ferry engine: remote transports, session
//! ownership, per-call-site retry, configuration helpers, metric events and
//! tracing setup.

pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod session;
pub mod tracing;
pub mod transport;

pub use error::{ErrorKind, TransportError};
pub use session::{OpenPurpose, Session};
pub use transport::{Connector, Credentials, DirEntry, Transport};

//! Error types for lease-hosts.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the libvirt daemon.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Socket IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The daemon closed the connection
    #[error("connection closed by libvirt daemon")]
    Closed,

    /// No session is open
    #[error("not connected")]
    NotConnected,

    /// Packet or payload could not be decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The daemon answered with an error
    #[error("libvirt error {code} (domain {domain}): {message}")]
    Remote {
        /// `virErrorNumber`
        code: i32,
        /// `virErrorDomain`
        domain: i32,
        /// Human readable message, empty if the daemon sent none.
        message: String,
    },
}

impl RpcError {
    /// Whether the session is unusable after this error.
    ///
    /// Remote errors leave the connection in sync; everything else does not.
    pub fn breaks_session(&self) -> bool {
        !matches!(self, RpcError::Remote { .. })
    }

    /// The remote error code, if the daemon reported one.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            RpcError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors that can occur in the lease mirroring daemon.
#[derive(Debug, Error)]
pub enum HostsError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Could not open a session with the libvirt daemon
    #[error("Failed to connect to libvirt: {0}")]
    Connect(#[source] RpcError),

    /// The configured network does not exist
    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    /// Network lookup failed for another reason
    #[error("Failed to lookup network: {0}")]
    Lookup(#[source] RpcError),

    /// A query against an open session failed
    #[error("Query failed: {0}")]
    Query(#[source] RpcError),

    /// The hosts file could not be published
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Releasing the session failed
    #[error("Failed to disconnect: {0}")]
    Disconnect(#[source] RpcError),
}

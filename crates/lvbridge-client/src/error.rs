//! Volume daemon client error types

use std::path::PathBuf;
use thiserror::Error;
use tonic::Code;

/// Error talking to the volume daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    /// The socket could not be reached
    #[error("failed to connect to lvmd at {}: {source}", socket.display())]
    Connect {
        socket: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },

    /// An RPC returned a non-OK status
    #[error("lvmd {rpc} failed: {}", status.message())]
    Rpc {
        rpc: &'static str,
        #[source]
        status: tonic::Status,
    },

    /// An RPC succeeded but its payload is unusable
    #[error("lvmd {rpc} returned an invalid response: {message}")]
    InvalidResponse { rpc: &'static str, message: String },

    /// A snapshot violated the capacity model
    #[error(transparent)]
    Model(#[from] lvbridge_common::Error),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

impl DaemonError {
    /// Wrap a status with the name of the RPC that produced it
    #[must_use]
    pub const fn rpc(rpc: &'static str, status: tonic::Status) -> Self {
        Self::Rpc { rpc, status }
    }

    pub fn invalid_response(rpc: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            rpc,
            message: message.into(),
        }
    }

    /// gRPC code reported by the daemon, if the failure was an RPC status
    #[must_use]
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Rpc { status, .. } => Some(status.code()),
            _ => None,
        }
    }

    /// Whether this error marks an orderly end of a stream
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        self.code() == Some(Code::Cancelled)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(Code::NotFound)
    }

    /// Whether the daemon refused for lack of space
    #[must_use]
    pub fn is_resource_exhausted(&self) -> bool {
        self.code() == Some(Code::ResourceExhausted)
    }
}

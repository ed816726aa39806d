//! Provisioning error types
//!
//! Each variant corresponds to one CSI status code so the calling protocol
//! layer can return it without reinterpretation.

use crate::provisioner::Operation;
use lvbridge_client::DaemonError;
use thiserror::Error;
use tonic::{Code, Status};

/// Volume provisioning error
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Malformed request (non-positive size, shrink, wrong node)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A volume with this name exists with an incompatible size
    #[error("Volume already exists: {name} ({existing} bytes, requested {requested} bytes)")]
    AlreadyExists {
        name: String,
        existing: i64,
        requested: i64,
    },

    /// Volume not found
    #[error("Volume not found: {0}")]
    NotFound(String),

    /// Not enough free capacity in the device class
    #[error("Insufficient capacity in device class '{device_class}': required {required} bytes, available {available} bytes")]
    ResourceExhausted {
        device_class: String,
        required: u64,
        available: u64,
    },

    /// Volume is still published to a node
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The backend does not implement this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(Operation),

    /// Daemon failure not covered by the conditions above
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// gRPC status code the CSI layer should answer with
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::AlreadyExists { .. } => Code::AlreadyExists,
            Self::NotFound(_) => Code::NotFound,
            Self::ResourceExhausted { .. } => Code::ResourceExhausted,
            Self::FailedPrecondition(_) => Code::FailedPrecondition,
            Self::Unsupported(_) => Code::Unimplemented,
            Self::Daemon(e) => e.code().unwrap_or(Code::Internal),
        }
    }
}

impl From<ProvisionError> for Status {
    fn from(err: ProvisionError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

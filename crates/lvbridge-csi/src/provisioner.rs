//! Logical volume provisioning contract
//!
//! A CSI controller or node service delegates Create/Delete/Expand here.
//! Backends advertise which operations they implement; the default method
//! bodies answer [`ProvisionError::Unsupported`] so a partial backend only
//! overrides what it supports.
//!
//! Capacity consumed or released by these operations is not accounted for
//! synchronously. It shows up in a later capacity snapshot from the daemon.

use crate::error::{ProvisionError, ProvisionResult};
use async_trait::async_trait;
use std::fmt;

/// Provisioning operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Delete,
    Expand,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CreateVolume",
            Self::Delete => "DeleteVolume",
            Self::Expand => "ExpandVolume",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of operations a backend implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub create: bool,
    pub delete: bool,
    pub expand: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        create: true,
        delete: true,
        expand: true,
    };

    pub const NONE: Self = Self {
        create: false,
        delete: false,
        expand: false,
    };

    #[must_use]
    pub const fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::Create => self.create,
            Operation::Delete => self.delete,
            Operation::Expand => self.expand,
        }
    }
}

/// Publication state of volumes, owned by the CSI controller/node services
#[async_trait]
pub trait PublishTracker: Send + Sync {
    /// Whether the volume is attached or published anywhere
    async fn is_published(&self, volume_id: &str) -> bool;
}

/// Tracker for deployments where nothing is ever published
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPublished;

#[async_trait]
impl PublishTracker for NeverPublished {
    async fn is_published(&self, _volume_id: &str) -> bool {
        false
    }
}

/// Create/Delete/Expand semantics consumed by the CSI layer
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Operations this backend implements
    fn capabilities(&self) -> Capabilities;

    /// Create a volume named `name` and return its ID
    ///
    /// Idempotent on `name`: a second call with a compatible size returns the
    /// existing ID. Fails with `AlreadyExists` on an incompatible size,
    /// `ResourceExhausted` without capacity, `InvalidArgument` when
    /// `size_bytes <= 0`.
    async fn create_volume(
        &self,
        _node_hint: Option<&str>,
        _name: &str,
        _size_bytes: i64,
    ) -> ProvisionResult<String> {
        Err(ProvisionError::Unsupported(Operation::Create))
    }

    /// Delete a volume; unknown IDs succeed
    ///
    /// Fails with `FailedPrecondition` while the volume is published.
    async fn delete_volume(&self, _id: &str) -> ProvisionResult<()> {
        Err(ProvisionError::Unsupported(Operation::Delete))
    }

    /// Grow a volume to `new_size_bytes`
    ///
    /// Fails with `NotFound` for unknown IDs, `InvalidArgument` unless the new
    /// size is strictly larger, `ResourceExhausted` when the device class
    /// lacks the difference.
    async fn expand_volume(&self, _id: &str, _new_size_bytes: i64) -> ProvisionResult<()> {
        Err(ProvisionError::Unsupported(Operation::Expand))
    }
}

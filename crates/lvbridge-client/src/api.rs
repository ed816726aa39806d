//! Traits over the two daemon services
//!
//! The reconciler only needs the volume-group side and the provisioner needs
//! both; splitting them keeps test doubles small.

use crate::error::DaemonResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use lvbridge_common::{CapacitySnapshot, VolumeHandle};

/// Stream of capacity snapshots, in arrival order
///
/// Ends with `None` only when the daemon closes the stream.
pub type CapacityStream = BoxStream<'static, DaemonResult<CapacitySnapshot>>;

/// Volume-group queries and the capacity watch
#[async_trait]
pub trait VolumeGroupApi: Send + Sync {
    /// Free bytes of `device_class`, or the aggregate when it is empty
    async fn free_bytes(&self, device_class: &str) -> DaemonResult<u64>;

    /// Volumes of `device_class`, or of every class when it is empty
    async fn list_volumes(&self, device_class: &str) -> DaemonResult<Vec<VolumeHandle>>;

    /// Open the capacity watch
    ///
    /// The first item is a full snapshot. There is no resumption token; a new
    /// call starts over with a fresh snapshot.
    async fn watch(&self) -> DaemonResult<CapacityStream>;
}

/// Logical volume lifecycle
#[async_trait]
pub trait LogicalVolumeApi: Send + Sync {
    async fn create_volume(
        &self,
        name: &str,
        size_gb: u64,
        device_class: &str,
    ) -> DaemonResult<VolumeHandle>;

    async fn remove_volume(&self, id: &str) -> DaemonResult<()>;

    async fn resize_volume(&self, id: &str, size_gb: u64) -> DaemonResult<()>;
}

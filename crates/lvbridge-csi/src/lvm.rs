//! Provisioner backed by the node-local volume daemon
//!
//! One instance serves exactly one node. Sizes are rounded up to whole GiB
//! before they reach the daemon.

use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioner::{Capabilities, PublishTracker, VolumeProvisioner};
use async_trait::async_trait;
use lvbridge_client::{DaemonError, LogicalVolumeApi, VolumeGroupApi};
use lvbridge_common::{GIB, VolumeHandle, bytes_to_gib_ceil};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Provisioner creating logical volumes through the daemon
pub struct LvmProvisioner<D> {
    node_name: String,
    device_class: String,
    daemon: Arc<D>,
    publish: Arc<dyn PublishTracker>,
    /// Serializes lookup-then-create so concurrent retries of one name
    /// cannot both create
    create_lock: Mutex<()>,
}

impl<D> LvmProvisioner<D>
where
    D: VolumeGroupApi + LogicalVolumeApi,
{
    pub fn new(
        node_name: impl Into<String>,
        device_class: impl Into<String>,
        daemon: Arc<D>,
        publish: Arc<dyn PublishTracker>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            device_class: device_class.into(),
            daemon,
            publish,
            create_lock: Mutex::new(()),
        }
    }

    async fn find_by_name(&self, name: &str) -> ProvisionResult<Option<VolumeHandle>> {
        let volumes = self.daemon.list_volumes("").await?;
        Ok(volumes.into_iter().find(|v| v.name == name))
    }

    async fn find_by_id(&self, id: &str) -> ProvisionResult<Option<VolumeHandle>> {
        let volumes = self.daemon.list_volumes("").await?;
        Ok(volumes.into_iter().find(|v| v.id == id))
    }

    /// Returns the free bytes the daemon reported
    async fn ensure_free(&self, device_class: &str, required: u64) -> ProvisionResult<u64> {
        let available = self.daemon.free_bytes(device_class).await?;
        if available < required {
            return Err(ProvisionError::ResourceExhausted {
                device_class: device_class.to_string(),
                required,
                available,
            });
        }
        Ok(available)
    }
}

/// Map a daemon-side capacity refusal onto the typed error
///
/// The pre-check can pass while the daemon still refuses: an empty device
/// class reports the aggregate over every class, and capacity can change
/// between the check and the call.
fn capacity_error(
    err: DaemonError,
    device_class: &str,
    required: u64,
    available: u64,
) -> ProvisionError {
    if err.is_resource_exhausted() {
        ProvisionError::ResourceExhausted {
            device_class: device_class.to_string(),
            required,
            available,
        }
    } else {
        err.into()
    }
}

fn positive_size(size_bytes: i64) -> ProvisionResult<u64> {
    u64::try_from(size_bytes)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| ProvisionError::invalid_argument(format!("size must be positive, got {size_bytes}")))
}

#[async_trait]
impl<D> VolumeProvisioner for LvmProvisioner<D>
where
    D: VolumeGroupApi + LogicalVolumeApi + 'static,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn create_volume(
        &self,
        node_hint: Option<&str>,
        name: &str,
        size_bytes: i64,
    ) -> ProvisionResult<String> {
        let requested = positive_size(size_bytes)?;
        if name.is_empty() {
            return Err(ProvisionError::invalid_argument("volume name is empty"));
        }
        if let Some(hint) = node_hint.filter(|h| !h.is_empty()) {
            if hint != self.node_name {
                return Err(ProvisionError::invalid_argument(format!(
                    "node {hint} requested but this provisioner serves {}",
                    self.node_name
                )));
            }
        }

        let _guard = self.create_lock.lock().await;

        if let Some(existing) = self.find_by_name(name).await? {
            if existing.size_bytes_u64() >= requested {
                debug!("Volume {} already exists as {}", name, existing.id);
                return Ok(existing.id);
            }
            return Err(ProvisionError::AlreadyExists {
                name: name.to_string(),
                existing: existing.size_bytes,
                requested: size_bytes,
            });
        }

        let size_gb = bytes_to_gib_ceil(requested);
        let required = size_gb * GIB;
        let available = self.ensure_free(&self.device_class, required).await?;

        let volume = self
            .daemon
            .create_volume(name, size_gb, &self.device_class)
            .await
            .map_err(|e| capacity_error(e, &self.device_class, required, available))?;
        info!(
            "Created volume {} ({}) with {} GiB on node {}",
            name, volume.id, size_gb, self.node_name
        );
        Ok(volume.id)
    }

    async fn delete_volume(&self, id: &str) -> ProvisionResult<()> {
        if self.find_by_id(id).await?.is_none() {
            debug!("Volume {} not found, nothing to delete", id);
            return Ok(());
        }
        if self.publish.is_published(id).await {
            return Err(ProvisionError::FailedPrecondition(format!(
                "volume {id} is still published"
            )));
        }

        match self.daemon.remove_volume(id).await {
            Ok(()) => {
                info!("Removed volume {} on node {}", id, self.node_name);
                Ok(())
            }
            // Removed concurrently between lookup and removal
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn expand_volume(&self, id: &str, new_size_bytes: i64) -> ProvisionResult<()> {
        let requested = positive_size(new_size_bytes)?;
        let volume = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(id.to_string()))?;

        let current = volume.size_bytes_u64();
        if requested <= current {
            return Err(ProvisionError::invalid_argument(format!(
                "new size {requested} must exceed current size {current}"
            )));
        }

        let size_gb = bytes_to_gib_ceil(requested);
        let delta = (size_gb * GIB).saturating_sub(current);
        let available = self.ensure_free(&volume.device_class, delta).await?;

        self.daemon
            .resize_volume(id, size_gb)
            .await
            .map_err(|e| capacity_error(e, &volume.device_class, delta, available))?;
        info!("Expanded volume {} to {} GiB", id, size_gb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::NeverPublished;
    use lvbridge_client::{CapacityStream, DaemonResult};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Daemon with a single device class kept in memory
    struct FakeDaemon {
        size_bytes: u64,
        /// Extra free bytes reported but not usable, as with an aggregate
        /// over several classes
        overstated: u64,
        volumes: SyncMutex<HashMap<String, VolumeHandle>>,
        /// Volumes another caller removes just before ours
        removed_elsewhere: SyncMutex<HashSet<String>>,
        creates: AtomicUsize,
        next_id: AtomicUsize,
    }

    impl FakeDaemon {
        fn new(size_bytes: u64) -> Self {
            Self {
                size_bytes,
                overstated: 0,
                volumes: SyncMutex::new(HashMap::new()),
                removed_elsewhere: SyncMutex::new(HashSet::new()),
                creates: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
            }
        }

        fn overstating(size_bytes: u64, overstated: u64) -> Self {
            Self {
                overstated,
                ..Self::new(size_bytes)
            }
        }

        fn used(&self) -> u64 {
            self.volumes.lock().values().map(VolumeHandle::size_bytes_u64).sum()
        }

        fn check_space(&self, rpc: &'static str, additional: u64) -> DaemonResult<()> {
            if self.used() + additional > self.size_bytes {
                return Err(DaemonError::rpc(
                    rpc,
                    tonic::Status::resource_exhausted("not enough space in volume group"),
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VolumeGroupApi for FakeDaemon {
        async fn free_bytes(&self, _device_class: &str) -> DaemonResult<u64> {
            Ok(self.size_bytes - self.used() + self.overstated)
        }

        async fn list_volumes(&self, _device_class: &str) -> DaemonResult<Vec<VolumeHandle>> {
            Ok(self.volumes.lock().values().cloned().collect())
        }

        async fn watch(&self) -> DaemonResult<CapacityStream> {
            Err(DaemonError::rpc("Watch", tonic::Status::unimplemented("watch")))
        }
    }

    #[async_trait]
    impl LogicalVolumeApi for FakeDaemon {
        async fn create_volume(
            &self,
            name: &str,
            size_gb: u64,
            device_class: &str,
        ) -> DaemonResult<VolumeHandle> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.check_space("CreateLV", size_gb * GIB)?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let volume = VolumeHandle {
                id: format!("lv-{n}"),
                name: name.to_string(),
                size_bytes: i64::try_from(size_gb * GIB).unwrap(),
                device_major: 253,
                device_minor: u32::try_from(n).unwrap(),
                device_class: device_class.to_string(),
            };
            self.volumes.lock().insert(volume.id.clone(), volume.clone());
            Ok(volume)
        }

        async fn remove_volume(&self, id: &str) -> DaemonResult<()> {
            if self.removed_elsewhere.lock().remove(id) {
                self.volumes.lock().remove(id);
                return Err(DaemonError::rpc("RemoveLV", tonic::Status::not_found(id)));
            }
            self.volumes
                .lock()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| DaemonError::rpc("RemoveLV", tonic::Status::not_found(id)))
        }

        async fn resize_volume(&self, id: &str, size_gb: u64) -> DaemonResult<()> {
            let current = self
                .volumes
                .lock()
                .get(id)
                .map(VolumeHandle::size_bytes_u64)
                .ok_or_else(|| DaemonError::rpc("ResizeLV", tonic::Status::not_found(id)))?;
            self.check_space("ResizeLV", (size_gb * GIB).saturating_sub(current))?;

            let mut volumes = self.volumes.lock();
            let volume = volumes
                .get_mut(id)
                .ok_or_else(|| DaemonError::rpc("ResizeLV", tonic::Status::not_found(id)))?;
            volume.size_bytes = i64::try_from(size_gb * GIB).unwrap();
            Ok(())
        }
    }

    struct AlwaysPublished;

    #[async_trait]
    impl PublishTracker for AlwaysPublished {
        async fn is_published(&self, _volume_id: &str) -> bool {
            true
        }
    }

    fn provisioner(size_bytes: u64) -> (Arc<FakeDaemon>, LvmProvisioner<FakeDaemon>) {
        let daemon = Arc::new(FakeDaemon::new(size_bytes));
        let provisioner =
            LvmProvisioner::new("worker-1", "ssd", daemon.clone(), Arc::new(NeverPublished));
        (daemon, provisioner)
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (daemon, provisioner) = provisioner(100 << 30);

        let first = provisioner
            .create_volume(Some("worker-1"), "v1", 10 << 30)
            .await
            .unwrap();
        let second = provisioner
            .create_volume(Some("worker-1"), "v1", 10 << 30)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(daemon.creates.load(Ordering::SeqCst), 1);
        assert_eq!(daemon.used(), 10 << 30);
    }

    #[tokio::test]
    async fn test_create_incompatible_size() {
        let (_daemon, provisioner) = provisioner(100 << 30);
        provisioner.create_volume(None, "v1", 10 << 30).await.unwrap();

        let err = provisioner
            .create_volume(None, "v1", 20 << 30)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::AlreadyExists { .. }));
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_invalid_arguments() {
        let (daemon, provisioner) = provisioner(100 << 30);

        for size in [0, -1] {
            let err = provisioner.create_volume(None, "v1", size).await.unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidArgument(_)));
        }

        let err = provisioner
            .create_volume(Some("worker-2"), "v1", 1 << 30)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidArgument(_)));
        assert_eq!(daemon.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_resource_exhausted() {
        let (daemon, provisioner) = provisioner(5 << 30);

        let err = provisioner
            .create_volume(None, "v1", 10 << 30)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ResourceExhausted {
                required,
                available,
                ..
            } if required == 10 << 30 && available == 5 << 30
        ));
        assert_eq!(daemon.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_rounds_up_to_gib() {
        let (daemon, provisioner) = provisioner(100 << 30);
        let id = provisioner.create_volume(None, "v1", 1).await.unwrap();
        let volumes = daemon.list_volumes("").await.unwrap();
        let volume = volumes.iter().find(|v| v.id == id).unwrap();
        assert_eq!(volume.size_bytes, 1 << 30);
        assert_eq!(volume.device_class, "ssd");
    }

    #[tokio::test]
    async fn test_delete_unknown_succeeds() {
        let (_daemon, provisioner) = provisioner(100 << 30);
        provisioner.delete_volume("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_volume() {
        let (daemon, provisioner) = provisioner(100 << 30);
        let id = provisioner.create_volume(None, "v1", 10 << 30).await.unwrap();

        provisioner.delete_volume(&id).await.unwrap();
        assert_eq!(daemon.used(), 0);
        // Second delete of the same ID is a no-op
        provisioner.delete_volume(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_published_volume() {
        let daemon = Arc::new(FakeDaemon::new(100 << 30));
        let provisioner =
            LvmProvisioner::new("worker-1", "ssd", daemon.clone(), Arc::new(AlwaysPublished));
        let id = provisioner.create_volume(None, "v1", 1 << 30).await.unwrap();

        let err = provisioner.delete_volume(&id).await.unwrap_err();
        assert!(matches!(err, ProvisionError::FailedPrecondition(_)));
        assert_eq!(daemon.used(), 1 << 30);
    }

    #[tokio::test]
    async fn test_expand_volume() {
        let (daemon, provisioner) = provisioner(100 << 30);
        let id = provisioner.create_volume(None, "v1", 10 << 30).await.unwrap();

        provisioner.expand_volume(&id, 20 << 30).await.unwrap();
        assert_eq!(daemon.used(), 20 << 30);
    }

    #[tokio::test]
    async fn test_expand_rejects_shrink_and_same_size() {
        let (_daemon, provisioner) = provisioner(100 << 30);
        let id = provisioner.create_volume(None, "v1", 10 << 30).await.unwrap();

        let err = provisioner.expand_volume(&id, 5 << 30).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidArgument(_)));

        let err = provisioner.expand_volume(&id, 10 << 30).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_expand_unknown_and_exhausted() {
        let (_daemon, provisioner) = provisioner(15 << 30);

        let err = provisioner.expand_volume("missing", 1 << 30).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound(_)));

        let id = provisioner.create_volume(None, "v1", 10 << 30).await.unwrap();
        let err = provisioner.expand_volume(&id, 20 << 30).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ResourceExhausted { required, .. } if required == 10 << 30
        ));
    }

    #[tokio::test]
    async fn test_delete_removed_concurrently() {
        let (daemon, provisioner) = provisioner(100 << 30);
        let id = provisioner.create_volume(None, "v1", 1 << 30).await.unwrap();
        daemon.removed_elsewhere.lock().insert(id.clone());

        provisioner.delete_volume(&id).await.unwrap();
        assert_eq!(daemon.used(), 0);
    }

    #[tokio::test]
    async fn test_daemon_refusal_is_resource_exhausted() {
        // The daemon reports 20 GiB free but only 10 GiB is usable
        let daemon = Arc::new(FakeDaemon::overstating(10 << 30, 10 << 30));
        let provisioner =
            LvmProvisioner::new("worker-1", "", daemon.clone(), Arc::new(NeverPublished));

        let err = provisioner
            .create_volume(None, "v1", 15 << 30)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ResourceExhausted {
                required,
                available,
                ..
            } if required == 15 << 30 && available == 20 << 30
        ));
        assert_eq!(daemon.used(), 0);

        let id = provisioner.create_volume(None, "v2", 8 << 30).await.unwrap();
        let err = provisioner.expand_volume(&id, 12 << 30).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ResourceExhausted { required, .. } if required == 4 << 30
        ));
        assert_eq!(daemon.used(), 8 << 30);
    }
}

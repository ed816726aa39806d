//! In-memory doubles for the daemon watch and the cluster API

use crate::api::{NodeApi, NodeApiError};
use crate::record::{NodePatch, NodeRecord};
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use lvbridge_client::{CapacityStream, DaemonError, DaemonResult, VolumeGroupApi};
use lvbridge_common::{CapacitySnapshot, VolumeHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub type WatchSender = mpsc::UnboundedSender<DaemonResult<CapacitySnapshot>>;

/// Daemon whose watch stream is fed by the test
pub struct ChannelWatch {
    rx: Mutex<Option<mpsc::UnboundedReceiver<DaemonResult<CapacitySnapshot>>>>,
}

impl ChannelWatch {
    pub fn new() -> (Self, WatchSender) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl VolumeGroupApi for ChannelWatch {
    async fn free_bytes(&self, _device_class: &str) -> DaemonResult<u64> {
        Ok(0)
    }

    async fn list_volumes(&self, _device_class: &str) -> DaemonResult<Vec<VolumeHandle>> {
        Ok(Vec::new())
    }

    async fn watch(&self) -> DaemonResult<CapacityStream> {
        let rx = self.rx.lock().take().ok_or_else(|| {
            DaemonError::rpc("Watch", tonic::Status::unavailable("watch already taken"))
        })?;
        Ok(rx.boxed())
    }
}

/// Single Node kept in memory with API-server-like versioning
pub struct MemoryNodeApi {
    node: Mutex<NodeRecord>,
    version: AtomicUsize,
    patches: Mutex<Vec<NodePatch>>,
    gets: AtomicUsize,
    /// Simulate another writer updating the Node right after the next get
    interfere_after_get: AtomicBool,
    fail_next_get: Mutex<Option<NodeApiError>>,
    fail_next_patch: Mutex<Option<NodeApiError>>,
}

impl MemoryNodeApi {
    pub fn new(node: NodeRecord) -> Self {
        Self {
            node: Mutex::new(node),
            version: AtomicUsize::new(1),
            patches: Mutex::new(Vec::new()),
            gets: AtomicUsize::new(0),
            interfere_after_get: AtomicBool::new(false),
            fail_next_get: Mutex::new(None),
            fail_next_patch: Mutex::new(None),
        }
    }

    /// Current state with the current resource version
    pub fn node(&self) -> NodeRecord {
        let mut node = self.node.lock().clone();
        node.resource_version = Some(self.version.load(Ordering::SeqCst).to_string());
        node
    }

    /// Mutate the Node as an external writer would
    pub fn update(&self, f: impl FnOnce(&mut NodeRecord)) {
        f(&mut *self.node.lock());
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn patches(&self) -> Vec<NodePatch> {
        self.patches.lock().clone()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn interfere_after_next_get(&self) {
        self.interfere_after_get.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_get(&self, err: NodeApiError) {
        *self.fail_next_get.lock() = Some(err);
    }

    pub fn fail_next_patch(&self, err: NodeApiError) {
        *self.fail_next_patch.lock() = Some(err);
    }
}

#[async_trait]
impl NodeApi for MemoryNodeApi {
    async fn get(&self, name: &str) -> Result<NodeRecord, NodeApiError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next_get.lock().take() {
            return Err(err);
        }
        let node = self.node();
        if node.name != name {
            return Err(NodeApiError::NotFound(name.to_string()));
        }
        if self.interfere_after_get.swap(false, Ordering::SeqCst) {
            self.update(|n| {
                n.annotations
                    .insert("other.io/touched".to_string(), "yes".to_string());
            });
        }
        Ok(node)
    }

    async fn patch(&self, name: &str, patch: &NodePatch) -> Result<(), NodeApiError> {
        if let Some(err) = self.fail_next_patch.lock().take() {
            return Err(err);
        }
        let current = self.version.load(Ordering::SeqCst).to_string();
        if patch.resource_version.as_deref() != Some(current.as_str()) {
            return Err(NodeApiError::Conflict(name.to_string()));
        }
        self.patches.lock().push(patch.clone());
        self.update(|n| patch.apply(n));
        Ok(())
    }
}

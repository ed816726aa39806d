//! Capacity reconciler
//!
//! Consumes the daemon's capacity watch and, for each snapshot in arrival
//! order, publishes gauges and brings the Node's finalizer and capacity
//! annotations in line with it. Snapshots are handled one at a time: the
//! patch for snapshot N completes or fails before snapshot N+1 is read, so
//! two patches from one reconciler are never in flight together.
//!
//! State machine:
//!
//! ```text
//! Starting ──first snapshot──▶ Streaming ──deletion timestamp──▶ Draining
//!     │                           │
//!     └───────────┬───────────────┴──fatal error──▶ Failed
//!                 └──end of stream / cancel──▶ Stopped
//! ```
//!
//! A patch conflict is not retried here. The next snapshot re-fetches the
//! Node and reapplies the same values.

use crate::api::{NodeApi, NodeApiError};
use crate::error::ReconcileError;
use crate::metrics::CapacityMetrics;
use crate::record::NodePatch;
use futures::StreamExt;
use lvbridge_client::VolumeGroupApi;
use lvbridge_common::CapacitySnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Watch requested, no snapshot yet
    Starting,
    /// Processing snapshots
    Streaming,
    /// Node is being deleted; no further patches
    Draining,
    /// Stream ended or cancellation requested
    Stopped,
    /// Fatal error returned to the supervisor
    Failed,
}

impl ReconcilerState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Result of reconciling one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A patch was applied
    Patched,
    /// The Node already matched the snapshot
    Unchanged,
    /// The Node is being deleted
    Draining,
}

/// Watch → metrics → Node patch loop for one node
pub struct CapacityReconciler {
    node_name: String,
    daemon: Arc<dyn VolumeGroupApi>,
    nodes: Arc<dyn NodeApi>,
    metrics: Arc<CapacityMetrics>,
    state: RwLock<ReconcilerState>,
}

impl CapacityReconciler {
    pub fn new(
        node_name: impl Into<String>,
        daemon: Arc<dyn VolumeGroupApi>,
        nodes: Arc<dyn NodeApi>,
        metrics: Arc<CapacityMetrics>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            daemon,
            nodes,
            metrics,
            state: RwLock::new(ReconcilerState::Starting),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReconcilerState {
        *self.state.read()
    }

    fn transition(&self, next: ReconcilerState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(
                node = %self.node_name,
                "Reconciler {} -> {}",
                state.as_str(),
                next.as_str()
            );
            *state = next;
        }
    }

    fn stop(&self) -> Result<(), ReconcileError> {
        self.transition(ReconcilerState::Stopped);
        Ok(())
    }

    fn fail(&self, err: ReconcileError) -> ReconcileError {
        error!(node = %self.node_name, "Capacity reconciler failed: {}", err);
        self.transition(ReconcilerState::Failed);
        err
    }

    fn watch_error(&self, source: lvbridge_client::DaemonError) -> ReconcileError {
        self.fail(ReconcileError::Watch {
            node: self.node_name.clone(),
            source,
        })
    }

    /// Run until the stream ends, the Node starts draining, `cancel` fires,
    /// or a fatal error occurs
    ///
    /// Only fatal errors are returned; the supervisor decides whether to
    /// restart.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ReconcileError> {
        self.transition(ReconcilerState::Starting);
        info!(node = %self.node_name, "Starting capacity reconciler");

        let opened = tokio::select! {
            () = cancel.cancelled() => return self.stop(),
            opened = self.daemon.watch() => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) if e.is_graceful() => return self.stop(),
            Err(e) => return Err(self.watch_error(e)),
        };

        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => {
                    info!(node = %self.node_name, "Capacity reconciler cancelled");
                    return self.stop();
                }
                item = stream.next() => item,
            };

            let snapshot = match item {
                None => {
                    info!(node = %self.node_name, "Capacity watch closed");
                    return self.stop();
                }
                Some(Err(e)) if e.is_graceful() => {
                    info!(node = %self.node_name, "Capacity watch cancelled by daemon");
                    return self.stop();
                }
                Some(Err(e)) => return Err(self.watch_error(e)),
                Some(Ok(snapshot)) => snapshot,
            };

            // Reserved or duplicate classes would clobber the aggregate annotation
            if let Err(e) = snapshot.validate() {
                return Err(self.watch_error(e.into()));
            }

            if self.state() == ReconcilerState::Starting {
                self.transition(ReconcilerState::Streaming);
            }

            self.metrics.record(&snapshot);

            let outcome = tokio::select! {
                () = cancel.cancelled() => return self.stop(),
                outcome = self.reconcile_node(&snapshot) => outcome,
            };

            match outcome {
                Ok(SyncOutcome::Patched) => {
                    debug!(node = %self.node_name, "Node capacity annotations updated");
                }
                Ok(SyncOutcome::Unchanged) => {
                    debug!(node = %self.node_name, "Node capacity annotations up to date");
                }
                Ok(SyncOutcome::Draining) => {
                    info!(
                        node = %self.node_name,
                        "Node is being deleted, stopping capacity updates"
                    );
                    self.transition(ReconcilerState::Draining);
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        node = %self.node_name,
                        "Node changed while patching, next snapshot will reapply: {}",
                        e
                    );
                }
                Err(source) => {
                    return Err(self.fail(ReconcileError::Node {
                        node: self.node_name.clone(),
                        source,
                    }));
                }
            }
        }
    }

    /// Fetch the Node and patch it to reflect `snapshot`
    pub async fn reconcile_node(
        &self,
        snapshot: &CapacitySnapshot,
    ) -> Result<SyncOutcome, NodeApiError> {
        let node = self.nodes.get(&self.node_name).await?;
        if node.is_terminating() {
            return Ok(SyncOutcome::Draining);
        }

        let patch = NodePatch::for_snapshot(&node, snapshot);
        if patch.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }

        match self.nodes.patch(&self.node_name, &patch).await {
            Ok(()) => Ok(SyncOutcome::Patched),
            // Deletion started between our read and the patch
            Err(e) if e.is_terminating() => Ok(SyncOutcome::Draining),
            Err(e) => Err(e),
        }
    }
}

//! LVBridge Node - capacity reconciliation
//!
//! This crate turns the volume daemon's capacity stream into cluster state:
//! - **CapacityMetrics**: owned gauge registry with Prometheus text export
//! - **NodeApi**: fetch/patch seam over the cluster Node object, with a
//!   kube-backed implementation
//! - **CapacityReconciler**: the sequential watch → metrics → Node patch loop

pub mod api;
pub mod cluster;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod record;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{NodeApi, NodeApiError};
pub use cluster::KubeNodeApi;
pub use error::ReconcileError;
pub use metrics::CapacityMetrics;
pub use reconciler::{CapacityReconciler, ReconcilerState, SyncOutcome};
pub use record::{NodePatch, NodeRecord};

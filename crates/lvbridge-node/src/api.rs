//! Cluster Node access
//!
//! The reconciler never caches a Node: it fetches, computes a patch against
//! what it fetched, and lets the API server reject the patch if the object
//! moved on in the meantime.

use crate::record::{NodePatch, NodeRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Error from the cluster API
#[derive(Error, Debug)]
pub enum NodeApiError {
    /// Node does not exist
    #[error("node not found: {0}")]
    NotFound(String),

    /// The patch's resource version is stale
    #[error("conflicting update to node {0}")]
    Conflict(String),

    /// The Node is being deleted and refuses new finalizers
    #[error("node {0} is being deleted")]
    Terminating(String),

    /// Any other rejection by the API server
    #[error("cluster API error: {0}")]
    Api(String),

    /// Transport or client-side failure
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl NodeApiError {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub const fn is_terminating(&self) -> bool {
        matches!(self, Self::Terminating(_))
    }
}

/// Fetch and conditionally patch a Node object
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Read the current state of the Node
    async fn get(&self, name: &str) -> Result<NodeRecord, NodeApiError>;

    /// Apply a merge patch, conditional on `patch.resource_version`
    async fn patch(&self, name: &str, patch: &NodePatch) -> Result<(), NodeApiError>;
}

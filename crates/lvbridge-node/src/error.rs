//! Reconciler error types

use crate::api::NodeApiError;
use lvbridge_client::DaemonError;
use thiserror::Error;

/// Fatal reconciler error, returned to the supervisor
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The capacity watch failed to open or broke
    #[error("capacity watch for node {node} failed: {source}")]
    Watch {
        node: String,
        #[source]
        source: DaemonError,
    },

    /// Fetching or patching the Node failed
    #[error("reconciling node {node} failed: {source}")]
    Node {
        node: String,
        #[source]
        source: NodeApiError,
    },
}

impl ReconcileError {
    /// Name of the Node the failing reconciler served
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::Watch { node, .. } | Self::Node { node, .. } => node,
        }
    }
}

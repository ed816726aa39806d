//! Kubernetes-backed [`NodeApi`]

use crate::api::{NodeApi, NodeApiError};
use crate::record::{NodePatch, NodeRecord};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Field manager recorded on every patch
pub const FIELD_MANAGER: &str = "lvbridge-agent";

/// Node access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeNodeApi {
    api: Api<Node>,
}

impl KubeNodeApi {
    /// Create a new KubeNodeApi wrapping the given kube Client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name_any(),
            resource_version: node.resource_version(),
            deletion_timestamp: node.metadata.deletion_timestamp.as_ref().map(|t| t.0),
            finalizers: node.finalizers().to_vec(),
            annotations: node.annotations().clone(),
        }
    }
}

/// Map API server rejections onto the cases the reconciler distinguishes
fn classify(name: &str, err: kube::Error) -> NodeApiError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => NodeApiError::NotFound(name.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => NodeApiError::Conflict(name.to_string()),
        // "no new finalizers can be added if the object is being deleted"
        kube::Error::Api(ae) if ae.code == 422 && ae.message.contains("being deleted") => {
            NodeApiError::Terminating(name.to_string())
        }
        kube::Error::Api(ae) => NodeApiError::Api(format!("{} ({})", ae.message, ae.code)),
        other => NodeApiError::Kube(other),
    }
}

#[async_trait]
impl NodeApi for KubeNodeApi {
    async fn get(&self, name: &str) -> Result<NodeRecord, NodeApiError> {
        let node = self.api.get(name).await.map_err(|e| classify(name, e))?;
        Ok(NodeRecord::from(&node))
    }

    async fn patch(&self, name: &str, patch: &NodePatch) -> Result<(), NodeApiError> {
        let body = patch.to_merge_patch();
        debug!(node = name, patch = %body, "Patching node");

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api
            .patch(name, &params, &Patch::Merge(&body))
            .await
            .map_err(|e| classify(name, e))?;
        Ok(())
    }
}

//! Node object state as seen by the reconciler
//!
//! The agent owns exactly one finalizer and the capacity annotation family on
//! its Node. [`NodePatch`] only ever names those keys; everything else on the
//! object is left to its other owners.

use chrono::{DateTime, Utc};
use lvbridge_common::{
    CapacitySnapshot, DEFAULT_DEVICE_CLASS, NODE_FINALIZER, capacity_annotation_key,
    device_class_from_annotation,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// The subset of a cluster Node the reconciler reads
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    /// Version the record was read at; patches are conditional on it
    pub resource_version: Option<String>,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub finalizers: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether the Node is being deleted
    #[must_use]
    pub const fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Owned capacity annotations, keyed by device class
    pub fn capacity_annotations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.annotations.iter().filter_map(|(k, v)| {
            device_class_from_annotation(k).map(|class| (class, v.as_str()))
        })
    }
}

/// Merge patch over the owned part of a Node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePatch {
    /// Precondition: the version the patch was computed against
    pub resource_version: Option<String>,
    /// Full replacement finalizer list, when it changes
    pub finalizers: Option<Vec<String>>,
    /// Annotation updates; `None` removes the key
    pub annotations: BTreeMap<String, Option<String>>,
}

impl NodePatch {
    /// Compute the patch bringing `node` in line with `snapshot`
    ///
    /// The default-class key gets the aggregate free bytes, every device
    /// class gets its own free bytes, and owned keys for classes missing from
    /// the snapshot are removed. The finalizer is appended when absent
    /// without disturbing the others.
    pub fn for_snapshot(node: &NodeRecord, snapshot: &CapacitySnapshot) -> Self {
        let mut desired = BTreeMap::new();
        desired.insert(
            capacity_annotation_key(DEFAULT_DEVICE_CLASS),
            snapshot.aggregate_free_bytes.to_string(),
        );
        for item in &snapshot.items {
            desired.insert(
                capacity_annotation_key(&item.device_class),
                item.free_bytes.to_string(),
            );
        }

        let mut annotations = BTreeMap::new();
        for (key, value) in &desired {
            if node.annotations.get(key) != Some(value) {
                annotations.insert(key.clone(), Some(value.clone()));
            }
        }
        for key in node.annotations.keys() {
            if device_class_from_annotation(key).is_some() && !desired.contains_key(key) {
                annotations.insert(key.clone(), None);
            }
        }

        let finalizers = (!node.has_finalizer(NODE_FINALIZER)).then(|| {
            let mut finalizers = node.finalizers.clone();
            finalizers.push(NODE_FINALIZER.to_string());
            finalizers
        });

        Self {
            resource_version: node.resource_version.clone(),
            finalizers,
            annotations,
        }
    }

    /// Whether applying this patch would change nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finalizers.is_none() && self.annotations.is_empty()
    }

    /// JSON merge patch body
    #[must_use]
    pub fn to_merge_patch(&self) -> Value {
        let mut metadata = Map::new();
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".into(), json!(rv));
        }
        if let Some(finalizers) = &self.finalizers {
            metadata.insert("finalizers".into(), json!(finalizers));
        }
        if !self.annotations.is_empty() {
            metadata.insert("annotations".into(), json!(self.annotations));
        }
        json!({ "metadata": metadata })
    }

    /// Apply to a local copy, as the API server would
    pub fn apply(&self, node: &mut NodeRecord) {
        if let Some(finalizers) = &self.finalizers {
            node.finalizers.clone_from(finalizers);
        }
        for (key, value) in &self.annotations {
            match value {
                Some(v) => {
                    node.annotations.insert(key.clone(), v.clone());
                }
                None => {
                    node.annotations.remove(key);
                }
            }
        }
    }
}

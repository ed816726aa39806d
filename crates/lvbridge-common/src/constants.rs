//! Cluster-object keys and size units shared by the agent and the provisioner

/// Finalizer the agent places on its Node object
pub const NODE_FINALIZER: &str = "lvbridge.io/node";

/// Prefix of every capacity annotation owned by the agent
pub const CAPACITY_ANNOTATION_PREFIX: &str = "capacity.lvbridge.io/";

/// Reserved device class standing for "default/unspecified"
///
/// The annotation under this class carries the aggregate free bytes of the
/// whole node. Daemons must never report an item with this name.
pub const DEFAULT_DEVICE_CLASS: &str = "00default";

/// Bytes per GiB; the daemon sizes volumes in whole GiB
pub const GIB: u64 = 1 << 30;

/// Annotation key holding the free bytes of `device_class`
#[must_use]
pub fn capacity_annotation_key(device_class: &str) -> String {
    format!("{CAPACITY_ANNOTATION_PREFIX}{device_class}")
}

/// Returns the device class of an owned annotation key, if it is one
#[must_use]
pub fn device_class_from_annotation(key: &str) -> Option<&str> {
    key.strip_prefix(CAPACITY_ANNOTATION_PREFIX)
}

/// Round a byte count up to whole GiB
#[must_use]
pub const fn bytes_to_gib_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(GIB)
}

//! Capacity and volume types
//!
//! These mirror what the node-local volume daemon reports, decoupled from the
//! protobuf wire types so the reconciler and provisioner can be tested without
//! a daemon.

use crate::constants::DEFAULT_DEVICE_CLASS;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Capacity of one device class at one point in time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClassCapacity {
    pub device_class: String,
    pub free_bytes: u64,
    pub size_bytes: u64,
}

impl DeviceClassCapacity {
    pub fn new(device_class: impl Into<String>, free_bytes: u64, size_bytes: u64) -> Self {
        Self {
            device_class: device_class.into(),
            free_bytes,
            size_bytes,
        }
    }
}

/// One complete capacity report covering every device class
///
/// Snapshots carry no sequence number; the most recently received one is
/// authoritative.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub items: Vec<DeviceClassCapacity>,
    pub aggregate_free_bytes: u64,
}

impl CapacitySnapshot {
    pub fn new(aggregate_free_bytes: u64, items: Vec<DeviceClassCapacity>) -> Self {
        Self {
            items,
            aggregate_free_bytes,
        }
    }

    /// Check that device classes are named, unique and not the reserved
    /// default class
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if item.device_class.is_empty() {
                return Err(Error::invalid_snapshot("empty device class name"));
            }
            if item.device_class == DEFAULT_DEVICE_CLASS {
                return Err(Error::invalid_snapshot(format!(
                    "device class {DEFAULT_DEVICE_CLASS} is reserved"
                )));
            }
            if !seen.insert(item.device_class.as_str()) {
                return Err(Error::invalid_snapshot(format!(
                    "duplicate device class {}",
                    item.device_class
                )));
            }
        }
        Ok(())
    }

    /// Look up a device class in this snapshot
    #[must_use]
    pub fn get(&self, device_class: &str) -> Option<&DeviceClassCapacity> {
        self.items.iter().find(|i| i.device_class == device_class)
    }
}

/// A logical volume as reported by the daemon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHandle {
    /// Opaque volume ID assigned by the daemon
    pub id: String,
    /// Name requested at creation; creation is idempotent on it
    pub name: String,
    pub size_bytes: i64,
    pub device_major: u32,
    pub device_minor: u32,
    /// Device class the volume was carved from (empty for the daemon default)
    pub device_class: String,
}

impl VolumeHandle {
    /// Size in bytes as an unsigned quantity, for capacity arithmetic
    #[must_use]
    pub fn size_bytes_u64(&self) -> u64 {
        u64::try_from(self.size_bytes).unwrap_or(0)
    }
}

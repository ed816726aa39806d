//! Conversions between wire messages and common types

use crate::error::{DaemonError, DaemonResult};
use lvbridge_common::{CapacitySnapshot, DeviceClassCapacity, GIB, VolumeHandle};
use lvbridge_proto::lvmd::{LogicalVolume, WatchItem, WatchResponse};

/// Build a validated snapshot from a watch message
pub fn snapshot_from_proto(resp: WatchResponse) -> DaemonResult<CapacitySnapshot> {
    let snapshot = CapacitySnapshot::new(
        resp.free_bytes,
        resp.items.into_iter().map(capacity_from_proto).collect(),
    );
    snapshot.validate()?;
    Ok(snapshot)
}

fn capacity_from_proto(item: WatchItem) -> DeviceClassCapacity {
    DeviceClassCapacity {
        device_class: item.device_class,
        free_bytes: item.free_bytes,
        size_bytes: item.size_bytes,
    }
}

/// Convert a daemon volume; sizes travel in GiB
pub fn volume_from_proto(rpc: &'static str, lv: LogicalVolume) -> DaemonResult<VolumeHandle> {
    if lv.id.is_empty() {
        return Err(DaemonError::invalid_response(rpc, "volume without id"));
    }
    let size_bytes = lv
        .size_gb
        .checked_mul(GIB)
        .and_then(|b| i64::try_from(b).ok())
        .ok_or_else(|| {
            DaemonError::invalid_response(rpc, format!("volume size {} GiB overflows", lv.size_gb))
        })?;

    Ok(VolumeHandle {
        id: lv.id,
        name: lv.name,
        size_bytes,
        device_major: lv.dev_major,
        device_minor: lv.dev_minor,
        device_class: lv.device_class,
    })
}

/// Wire form of a capacity snapshot, used by daemon implementations
#[must_use]
pub fn snapshot_to_proto(snapshot: &CapacitySnapshot) -> WatchResponse {
    WatchResponse {
        free_bytes: snapshot.aggregate_free_bytes,
        items: snapshot
            .items
            .iter()
            .map(|i| WatchItem {
                device_class: i.device_class.clone(),
                free_bytes: i.free_bytes,
                size_bytes: i.size_bytes,
            })
            .collect(),
    }
}

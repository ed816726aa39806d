//! LVBridge Client - volume daemon RPC client
//!
//! This crate provides the typed client for the node-local volume daemon and
//! the traits the reconciler and the provisioner consume it through.

pub mod api;
pub mod convert;
pub mod daemon;
pub mod error;

// Re-exports
pub use api::{CapacityStream, LogicalVolumeApi, VolumeGroupApi};
pub use daemon::DaemonClient;
pub use error::{DaemonError, DaemonResult};

//! LVBridge CSI - volume provisioning and readiness
//!
//! This crate provides:
//! - **VolumeProvisioner**: the Create/Delete/Expand contract a CSI
//!   controller delegates to, with a capability set so partial backends can
//!   decline operations instead of failing at runtime
//! - **LvmProvisioner**: the implementation backed by the node-local volume
//!   daemon
//! - **ReadinessChecker**: a latched readiness gate for health endpoints

pub mod error;
pub mod lvm;
pub mod provisioner;
pub mod readiness;

pub use error::{ProvisionError, ProvisionResult};
pub use lvm::LvmProvisioner;
pub use provisioner::{Capabilities, NeverPublished, Operation, PublishTracker, VolumeProvisioner};
pub use readiness::{CheckError, ReadinessChecker, ReadinessState};

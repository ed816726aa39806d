//! LVBridge Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for the node-local
//! volume daemon's gRPC services.

/// Volume daemon (volume-group and logical-volume services)
pub mod lvmd {
    tonic::include_proto!("lvbridge.lvmd");
}

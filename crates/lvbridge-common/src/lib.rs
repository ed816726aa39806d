//! LVBridge Common - Shared types and utilities
//!
//! This crate provides the capacity and volume types, the cluster-object
//! constants, configuration and error definitions used across all LVBridge
//! components.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::AgentConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use types::*;

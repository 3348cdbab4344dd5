//! # headroom-common
//!
//! Shared utilities and types for the headroom resource governor.
//!
//! This crate provides functionality used by every headroom crate:
//! - Cgroup scope name generation and validation
//! - Host filesystem roots (`/proc`, `/sys/fs/cgroup`)
//! - Throughput quantities parsed from benchmark tool output
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod rate;
pub mod scope;

pub use error::{HeadroomError, HeadroomResult};
pub use paths::HostPaths;
pub use rate::ByteRate;
pub use scope::ScopeName;

//! Governor runtime.
//!
//! This module provides configuration, the event bus and the launcher that
//! ties a child process to its governed cgroup.

mod config;
pub mod events;
mod launcher;

pub use config::{DEFAULT_INTERVAL, GovernorConfig};
pub use events::{EventBus, GovernorEvent, MonitorPhase};
pub use launcher::Launcher;

//! Governor event definitions and bus.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cgroup::ResourceLimits;

/// Lifecycle phase of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// Baseline taken, waiting for the first tick.
    Initializing,
    /// Applying limits every tick.
    Running,
    /// Terminal.
    Stopped,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Governor event types.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernorEvent {
    /// The monitor loop entered a new phase.
    PhaseChanged { phase: MonitorPhase, timestamp: i64 },
    /// A tick computed and wrote limits.
    LimitsApplied {
        tick: u64,
        limits: ResourceLimits,
        timestamp: i64,
    },
}

impl GovernorEvent {
    /// A phase change stamped with the current time.
    #[must_use]
    pub fn phase_changed(phase: MonitorPhase) -> Self {
        Self::PhaseChanged {
            phase,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// An applied-limits event stamped with the current time.
    #[must_use]
    pub fn limits_applied(tick: u64, limits: ResourceLimits) -> Self {
        Self::LimitsApplied {
            tick,
            limits,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Event bus for governor events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GovernorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event.
    pub fn publish(&self, event: GovernorEvent) {
        // Ignore SendError (no subscribers)
        let _ = self.sender.send(event);
    }
}

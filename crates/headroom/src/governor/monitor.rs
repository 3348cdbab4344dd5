//! Periodic monitor loop.

use std::sync::Arc;

use headroom_common::{HeadroomError, HeadroomResult};
use tokio::sync::oneshot::{self, error::TryRecvError};

use super::ResourceGovernor;
use crate::cgroup::ResourceController;
use crate::runtime::{EventBus, GovernorEvent, MonitorPhase};
use crate::system::SystemSource;

/// Runs a governor every interval until told to stop.
///
/// Initializing takes the baseline and waits one interval. Running checks
/// the stop signal, ticks, publishes the limits, then sleeps. Stopped is
/// terminal and leaves the cgroup in place. A dropped stop sender counts
/// as a stop.
#[derive(Debug)]
pub struct MonitorLoop<C, S> {
    governor: Arc<ResourceGovernor<C, S>>,
    events: EventBus,
}

impl<C, S> MonitorLoop<C, S>
where
    C: ResourceController + 'static,
    S: SystemSource + 'static,
{
    /// Create a loop publishing on `events`.
    #[must_use]
    pub const fn new(governor: Arc<ResourceGovernor<C, S>>, events: EventBus) -> Self {
        Self { governor, events }
    }

    /// Drive the governor until `stop` fires and return the number of ticks.
    ///
    /// No limit is written after the stop signal has been observed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the governor; the loop stops there.
    pub async fn run(self, mut stop: oneshot::Receiver<()>) -> HeadroomResult<u64> {
        self.enter(MonitorPhase::Initializing);

        if let Err(e) = self.blocking(ResourceGovernor::initialize).await {
            self.enter(MonitorPhase::Stopped);
            return Err(e);
        }

        if !self.sleep_or_stop(&mut stop).await {
            self.enter(MonitorPhase::Running);

            loop {
                if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }

                match self.blocking(ResourceGovernor::tick).await {
                    Ok(limits) => {
                        let tick = self.governor.ticks();
                        self.events.publish(GovernorEvent::limits_applied(tick, limits));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Governor tick failed");
                        self.enter(MonitorPhase::Stopped);
                        return Err(e);
                    }
                }

                if self.sleep_or_stop(&mut stop).await {
                    break;
                }
            }
        }

        self.enter(MonitorPhase::Stopped);
        Ok(self.governor.ticks())
    }

    /// Run a governor step on the blocking pool; it reads procfs and writes the cgroup.
    async fn blocking<T, F>(&self, step: F) -> HeadroomResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ResourceGovernor<C, S>) -> HeadroomResult<T> + Send + 'static,
    {
        let governor = Arc::clone(&self.governor);
        tokio::task::spawn_blocking(move || step(&governor))
            .await
            .map_err(|e| HeadroomError::Internal {
                message: format!("Task join error: {e}"),
            })?
    }

    /// Sleep one interval; `true` if the stop signal arrived first.
    async fn sleep_or_stop(&self, stop: &mut oneshot::Receiver<()>) -> bool {
        tokio::select! {
            biased;
            _ = &mut *stop => true,
            () = tokio::time::sleep(self.governor.interval()) => false,
        }
    }

    fn enter(&self, phase: MonitorPhase) {
        tracing::debug!(%phase, "Monitor phase changed");
        self.events.publish(GovernorEvent::phase_changed(phase));
    }
}

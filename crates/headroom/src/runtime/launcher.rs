//! Governed process launcher.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

use headroom_common::{HeadroomError, HeadroomResult, HostPaths, ScopeName};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinError;

use super::{EventBus, GovernorConfig};
use crate::benchmark::{DeviceBenchmark, ToolProbe, benchmark_all};
use crate::cgroup::{CONTROLLERS, CgroupManager, CgroupVersion, ResourceController};
use crate::device::DeviceCatalog;
use crate::governor::{MonitorLoop, ResourceGovernor};
use crate::system::{ProcSampler, SystemSource};

/// Whichever of the child and the monitor finished first.
enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    MonitorFinished(Result<HeadroomResult<u64>, JoinError>),
}

/// Starts a command under the governor and waits for it.
#[derive(Debug, Default)]
pub struct Launcher {
    config: GovernorConfig,
    events: EventBus,
}

impl Launcher {
    /// Create a launcher.
    #[must_use]
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
        }
    }

    /// The bus the monitor publishes on. Subscribe before calling [`Self::run`].
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Run `command` under the governor and return its exit code.
    ///
    /// A child killed by a signal yields `128 + signal`.
    ///
    /// # Errors
    ///
    /// Returns an error if a precondition fails, the child cannot be
    /// started, its cgroup cannot be set up, or the monitor fails. The child
    /// is killed if it is still running.
    pub async fn run(&self, command: &[String]) -> HeadroomResult<i32> {
        let (program, args) = command.split_first().ok_or_else(|| HeadroomError::Config {
            message: "no command given".to_string(),
        })?;

        self.config.validate()?;
        check_preconditions(&self.config.paths)?;

        let (catalog, benchmarks) = self.survey_devices().await?;

        let mut child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HeadroomError::Process {
                command: program.clone(),
                message: e.to_string(),
            })?;

        let Some(pid) = child.id() else {
            return Err(HeadroomError::Internal {
                message: format!("{program} exited before it could be governed"),
            });
        };
        tracing::info!(pid, command = %program, "Started governed process");

        let cgroup = match setup_cgroup(pid, &self.config.paths) {
            Ok(cgroup) => Arc::new(cgroup),
            Err(e) => {
                tracing::error!(pid, error = %e, "Cgroup setup failed, killing process");
                reap(&mut child).await;
                return Err(e);
            }
        };

        let governor = match ResourceGovernor::new(
            Arc::clone(&cgroup),
            ProcSampler::new(self.config.paths.clone()),
            &self.config,
        ) {
            Ok(governor) => governor.with_devices(catalog, benchmarks),
            Err(e) => {
                reap(&mut child).await;
                cleanup(cgroup.destroy());
                return Err(e);
            }
        };
        let monitor = MonitorLoop::new(Arc::new(governor), self.events.clone());

        supervise(program, pid, child, monitor, || cgroup.destroy()).await
    }

    /// Enumerate disks and measure their ceilings.
    async fn survey_devices(
        &self,
    ) -> HeadroomResult<(DeviceCatalog, HashMap<String, DeviceBenchmark>)> {
        let catalog = tokio::task::spawn_blocking(DeviceCatalog::discover)
            .await
            .map_err(|e| HeadroomError::Internal {
                message: format!("Task join error: {e}"),
            })??;

        if self.config.skip_benchmark {
            tracing::info!("Skipping disk benchmark, I/O will not be limited");
            return Ok((catalog, HashMap::new()));
        }

        let probe = self
            .config
            .scratch_dir
            .clone()
            .map_or_else(ToolProbe::read_only, ToolProbe::with_scratch_dir);
        if probe.scratch_dir().is_none() {
            tracing::warn!("No scratch directory given, write throughput will not be limited");
        }

        let benchmarks = tokio::task::spawn_blocking({
            let catalog = catalog.clone();
            move || benchmark_all(&catalog, &probe)
        })
        .await
        .map_err(|e| HeadroomError::Internal {
            message: format!("Task join error: {e}"),
        })?;

        Ok((catalog, benchmarks))
    }
}

/// Wait for the child while `monitor` governs it, then tear down.
///
/// A monitor failure, even one racing the child's exit, wins over the
/// exit code. `destroy` runs exactly once and its failure is only logged.
async fn supervise<C, S>(
    program: &str,
    pid: u32,
    mut child: Child,
    monitor: MonitorLoop<C, S>,
    destroy: impl FnOnce() -> HeadroomResult<()>,
) -> HeadroomResult<i32>
where
    C: ResourceController + 'static,
    S: SystemSource + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    let mut monitor_task = tokio::spawn(monitor.run(stop_rx));

    let outcome = tokio::select! {
        biased;
        result = &mut monitor_task => Outcome::MonitorFinished(result),
        status = child.wait() => Outcome::Exited(status),
    };

    match outcome {
        Outcome::Exited(status) => {
            // Receiver gone means the monitor already ended.
            let _ = stop_tx.send(());
            let monitor = monitor_task.await;
            cleanup(destroy());

            match monitor {
                Ok(Ok(ticks)) => tracing::debug!(ticks, "Monitor stopped"),
                Ok(Err(e)) => {
                    tracing::error!(pid, error = %e, "Monitor failed as the process exited");
                    return Err(e);
                }
                Err(e) => {
                    return Err(HeadroomError::Internal {
                        message: format!("monitor task failed: {e}"),
                    });
                }
            }

            let status = status.map_err(|e| HeadroomError::Process {
                command: program.to_string(),
                message: format!("failed to wait: {e}"),
            })?;
            let code = exit_code(status);
            tracing::info!(pid, exit_code = code, "Governed process exited");
            Ok(code)
        }
        Outcome::MonitorFinished(result) => {
            tracing::error!(pid, "Monitor ended before the process, killing it");
            reap(&mut child).await;
            cleanup(destroy());

            Err(match result {
                Ok(Err(e)) => e,
                Ok(Ok(ticks)) => HeadroomError::Internal {
                    message: format!("monitor stopped unprompted after {ticks} ticks"),
                },
                Err(e) => HeadroomError::Internal {
                    message: format!("monitor task failed: {e}"),
                },
            })
        }
    }
}

/// Require cgroup v2 and root.
fn check_preconditions(paths: &HostPaths) -> HeadroomResult<()> {
    let version = CgroupVersion::detect(&paths.cgroup_root);
    if version != CgroupVersion::V2 {
        tracing::debug!(?version, root = %paths.cgroup_root.display(), "Unsupported cgroup layout");
        return Err(HeadroomError::CgroupUnavailable {
            root: paths.cgroup_root.display().to_string(),
        });
    }

    if !rustix::process::geteuid().is_root() {
        return Err(HeadroomError::PermissionDenied {
            operation: "governing a process requires root".to_string(),
        });
    }

    Ok(())
}

/// Create the scope for `pid`, delegate controllers and move the process in.
fn setup_cgroup(pid: u32, paths: &HostPaths) -> HeadroomResult<CgroupManager> {
    let cgroup = CgroupManager::create(&ScopeName::for_pid(pid), paths)?;

    let configured = cgroup
        .enable_controllers(&CONTROLLERS)
        .and_then(|()| cgroup.attach(pid));

    if let Err(e) = configured {
        cleanup(cgroup.destroy());
        return Err(e);
    }

    tracing::info!(scope = %cgroup.scope(), path = %cgroup.path().display(), "Governing process");
    Ok(cgroup)
}

/// Kill the child and wait for it.
async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill governed process");
    }
}

/// Log a failed cgroup deletion.
fn cleanup(destroyed: HeadroomResult<()>) {
    if let Err(e) = destroyed {
        tracing::error!(error = %e, "Failed to delete cgroup");
    }
}

/// Shell-style exit code.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::cgroup::{CgroupSnapshot, ResourceLimits};
    use crate::device::IoCounters;
    use crate::system::{CpuTimes, MemoryInfo};

    struct FakeSystem;

    impl SystemSource for FakeSystem {
        fn read_memory(&self) -> HeadroomResult<MemoryInfo> {
            Ok(MemoryInfo {
                total_bytes: 1 << 30,
                available_bytes: 1 << 29,
            })
        }

        fn read_cpu_times(&self) -> HeadroomResult<CpuTimes> {
            Ok(CpuTimes::default())
        }

        fn read_disk_counters(&self) -> HeadroomResult<HashMap<String, IoCounters>> {
            Ok(HashMap::new())
        }
    }

    /// Serves empty stats until `reads_before_failure` reads have happened.
    struct FakeCgroup {
        reads_before_failure: Option<usize>,
        reads: AtomicUsize,
    }

    impl ResourceController for FakeCgroup {
        fn read_stats(&self) -> HeadroomResult<CgroupSnapshot> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.reads_before_failure.is_some_and(|limit| reads >= limit) {
                return Err(HeadroomError::Cgroup {
                    scope: "headroom-1".to_string(),
                    message: "cgroup vanished".to_string(),
                });
            }
            Ok(CgroupSnapshot {
                memory_ceiling: None,
                memory_current: 0,
                cpu_usage_usec: 0,
                io: HashMap::new(),
            })
        }

        fn apply_limits(&self, _limits: &ResourceLimits) -> HeadroomResult<()> {
            Ok(())
        }
    }

    fn monitor(
        reads_before_failure: Option<usize>,
        interval: Duration,
    ) -> MonitorLoop<FakeCgroup, FakeSystem> {
        let cgroup = Arc::new(FakeCgroup {
            reads_before_failure,
            reads: AtomicUsize::new(0),
        });
        let config = GovernorConfig::default().with_interval(interval);
        let governor = ResourceGovernor::new(cgroup, FakeSystem, &config).unwrap();
        MonitorLoop::new(Arc::new(governor), EventBus::new())
    }

    fn spawn_shell(script: &str) -> (Child, u32) {
        let child = Command::new("sh")
            .args(["-c", script])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        (child, pid)
    }

    #[tokio::test]
    async fn child_exit_code_is_returned() {
        let (child, pid) = spawn_shell("exit 3");
        let destroyed = AtomicBool::new(false);

        let code = supervise("sh", pid, child, monitor(None, Duration::from_secs(30)), || {
            destroyed.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(code, 3);
        assert!(destroyed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_cgroup_delete_keeps_exit_code() {
        let (child, pid) = spawn_shell("exit 7");

        let code = supervise("sh", pid, child, monitor(None, Duration::from_secs(30)), || {
            Err(HeadroomError::Cgroup {
                scope: "headroom-1".to_string(),
                message: "device or resource busy".to_string(),
            })
        })
        .await
        .unwrap();

        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn monitor_failure_kills_child() {
        // The baseline read succeeds, the first tick's read fails. Returning
        // well inside the child's sleep means it was killed and reaped.
        let (child, pid) = spawn_shell("sleep 30");
        let destroyed = AtomicBool::new(false);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            supervise("sh", pid, child, monitor(Some(1), Duration::from_millis(10)), || {
                destroyed.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(HeadroomError::Cgroup { .. })));
        assert!(destroyed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn monitor_failure_wins_over_exit() {
        // Both finish almost at once: the child exits and the baseline read fails.
        let (child, pid) = spawn_shell("exit 0");

        let result = supervise("sh", pid, child, monitor(Some(0), Duration::from_secs(30)), || Ok(()))
            .await;

        assert!(matches!(result, Err(HeadroomError::Cgroup { .. })));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // Killed by SIGKILL.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn requires_unified_hierarchy() {
        let temp = tempfile::tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path());
        std::fs::create_dir_all(paths.cgroup_root.join("memory")).unwrap();

        assert!(matches!(
            check_preconditions(&paths),
            Err(HeadroomError::CgroupUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let launcher = Launcher::default();
        assert!(matches!(
            launcher.run(&[]).await,
            Err(HeadroomError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_spawning() {
        let launcher = Launcher::new(GovernorConfig::default().with_margin(2.0));
        assert!(matches!(
            launcher.run(&["true".to_string()]).await,
            Err(HeadroomError::Config { .. })
        ));
    }
}

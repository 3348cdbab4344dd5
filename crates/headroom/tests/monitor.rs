//! Integration tests for the monitor loop over fake procfs and cgroup trees.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use headroom::cgroup::{CgroupManager, CgroupSnapshot, ResourceController, ResourceLimits};
use headroom::governor::{MonitorLoop, ResourceGovernor};
use headroom::runtime::{EventBus, GovernorConfig, GovernorEvent, MonitorPhase};
use headroom::system::ProcSampler;
use headroom_common::{HeadroomError, HeadroomResult, HostPaths, ScopeName};
use tempfile::TempDir;
use tokio::sync::oneshot;

const MEMINFO: &str = "MemTotal:       10485760 kB\nMemAvailable:    1048576 kB\n";
const STAT: &str = "cpu  900 0 0 100 0 0 0 0 0 0\n";
const DISKSTATS: &str = "   8       0 sda 0 0 0 0 0 0 0 0 0 0 0\n";

/// Delegates to a real manager, counting writes and optionally failing reads.
struct CountingController {
    inner: CgroupManager,
    applies: AtomicUsize,
    reads_before_failure: Option<usize>,
    reads: AtomicUsize,
}

impl ResourceController for CountingController {
    fn read_stats(&self) -> HeadroomResult<CgroupSnapshot> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.reads_before_failure.is_some_and(|limit| reads >= limit) {
            return Err(HeadroomError::Cgroup {
                scope: self.inner.scope().to_string(),
                message: "cgroup vanished".to_string(),
            });
        }
        self.inner.read_stats()
    }

    fn apply_limits(&self, limits: &ResourceLimits) -> HeadroomResult<()> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_limits(limits)
    }
}

struct Fixture {
    _temp: TempDir,
    paths: HostPaths,
    controller: Arc<CountingController>,
}

fn fixture(reads_before_failure: Option<usize>) -> Fixture {
    let temp = TempDir::new().unwrap();
    let paths = HostPaths::with_root(temp.path());

    std::fs::create_dir_all(&paths.proc_root).unwrap();
    std::fs::write(paths.meminfo(), MEMINFO).unwrap();
    std::fs::write(paths.stat(), STAT).unwrap();
    std::fs::write(paths.diskstats(), DISKSTATS).unwrap();

    std::fs::create_dir_all(&paths.cgroup_root).unwrap();
    let manager = CgroupManager::create(&ScopeName::for_pid(4242), &paths).unwrap();
    let dir = manager.path();
    std::fs::write(dir.join("memory.max"), "max\n").unwrap();
    std::fs::write(dir.join("memory.current"), "2147483648\n").unwrap();
    std::fs::write(dir.join("cpu.stat"), "usage_usec 0\n").unwrap();
    std::fs::write(dir.join("io.stat"), "").unwrap();

    Fixture {
        _temp: temp,
        paths,
        controller: Arc::new(CountingController {
            inner: manager,
            applies: AtomicUsize::new(0),
            reads_before_failure,
            reads: AtomicUsize::new(0),
        }),
    }
}

fn monitor(
    fixture: &Fixture,
    interval: Duration,
    events: &EventBus,
) -> MonitorLoop<CountingController, ProcSampler> {
    let config = GovernorConfig::default()
        .with_paths(fixture.paths.clone())
        .with_interval(interval);
    let governor = ResourceGovernor::new(
        Arc::clone(&fixture.controller),
        ProcSampler::new(fixture.paths.clone()).with_clock_ticks(100),
        &config,
    )
    .unwrap();
    MonitorLoop::new(Arc::new(governor), events.clone())
}

#[test_log::test(tokio::test)]
async fn writes_memory_ceiling_each_tick() {
    let fixture = fixture(None);
    let events = EventBus::new();
    let mut rx = events.subscribe();

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(monitor(&fixture, Duration::from_millis(10), &events).run(stop_rx));

    // Wait for two ticks.
    let mut applied = 0;
    while applied < 2 {
        if let GovernorEvent::LimitsApplied { limits, .. } = rx.recv().await.unwrap() {
            // 10GiB total, 1GiB available: exactly at the margin.
            assert_eq!(limits.memory_max, Some(2 * 1024 * 1024 * 1024));
            // /proc/stat never moves, so the CPU quota is left alone.
            assert!(limits.cpu.is_none());
            applied += 1;
        }
    }

    stop_tx.send(()).unwrap();
    let ticks = task.await.unwrap().unwrap();

    assert!(ticks >= 2);
    assert_eq!(fixture.controller.applies.load(Ordering::SeqCst) as u64, ticks);
    let memory_max =
        std::fs::read_to_string(fixture.controller.inner.path().join("memory.max")).unwrap();
    assert_eq!(memory_max, "2147483648");
}

#[test_log::test(tokio::test)]
async fn stop_during_sleep_prevents_further_applies() {
    let fixture = fixture(None);
    let events = EventBus::new();
    let mut rx = events.subscribe();

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(monitor(&fixture, Duration::from_millis(200), &events).run(stop_rx));

    loop {
        if let GovernorEvent::LimitsApplied { tick, .. } = rx.recv().await.unwrap() {
            assert_eq!(tick, 1);
            break;
        }
    }
    stop_tx.send(()).unwrap();

    assert_eq!(task.await.unwrap().unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fixture.controller.applies.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn stop_before_first_tick_applies_nothing() {
    let fixture = fixture(None);
    let events = EventBus::new();

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(monitor(&fixture, Duration::from_secs(30), &events).run(stop_rx));
    stop_tx.send(()).unwrap();

    assert_eq!(task.await.unwrap().unwrap(), 0);
    assert_eq!(fixture.controller.applies.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn dropped_sender_stops_loop() {
    let fixture = fixture(None);
    let events = EventBus::new();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(monitor(&fixture, Duration::from_millis(10), &events).run(stop_rx));
    drop(stop_tx);

    let ticks = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(ticks, 0);
}

#[test_log::test(tokio::test)]
async fn read_failure_ends_loop_with_error() {
    // The baseline read succeeds, the first tick's read fails.
    let fixture = fixture(Some(1));
    let events = EventBus::new();
    let mut rx = events.subscribe();

    let (_stop_tx, stop_rx) = oneshot::channel();
    let result = monitor(&fixture, Duration::from_millis(10), &events)
        .run(stop_rx)
        .await;

    assert!(matches!(result, Err(HeadroomError::Cgroup { .. })));
    assert_eq!(fixture.controller.applies.load(Ordering::SeqCst), 0);

    let mut phases = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let GovernorEvent::PhaseChanged { phase, .. } = event {
            phases.push(phase);
        }
    }
    assert_eq!(
        phases,
        [
            MonitorPhase::Initializing,
            MonitorPhase::Running,
            MonitorPhase::Stopped
        ]
    );
}

//! procfs-backed system sampler.

use std::collections::HashMap;
use std::path::Path;

use headroom_common::{HeadroomError, HeadroomResult, HostPaths};

use super::{CpuTimes, MemoryInfo, SystemSource};
use crate::device::IoCounters;

/// `/proc/diskstats` counts 512-byte sectors regardless of the device.
const SECTOR_SIZE: u64 = 512;

const USEC_PER_SEC: u128 = 1_000_000;

/// Reads machine counters from procfs.
#[derive(Debug, Clone)]
pub struct ProcSampler {
    paths: HostPaths,
    /// `USER_HZ`, the unit of `/proc/stat`.
    clock_ticks: u64,
}

impl ProcSampler {
    /// Create a sampler over the given roots.
    #[must_use]
    pub fn new(paths: HostPaths) -> Self {
        Self {
            paths,
            clock_ticks: rustix::param::clock_ticks_per_second(),
        }
    }

    /// Override the `/proc/stat` tick rate.
    #[must_use]
    pub const fn with_clock_ticks(mut self, clock_ticks: u64) -> Self {
        self.clock_ticks = clock_ticks;
        self
    }

    fn ticks_to_usec(&self, ticks: u64) -> u64 {
        let hz = u128::from(self.clock_ticks.max(1));
        u64::try_from(u128::from(ticks) * USEC_PER_SEC / hz).unwrap_or(u64::MAX)
    }
}

impl SystemSource for ProcSampler {
    fn read_memory(&self) -> HeadroomResult<MemoryInfo> {
        let path = self.paths.meminfo();
        parse_meminfo(&read(&path)?, &path)
    }

    fn read_cpu_times(&self) -> HeadroomResult<CpuTimes> {
        let path = self.paths.stat();
        let ticks = parse_stat_cpu_line(&read(&path)?, &path)?;
        Ok(CpuTimes {
            user: self.ticks_to_usec(ticks.user),
            nice: self.ticks_to_usec(ticks.nice),
            system: self.ticks_to_usec(ticks.system),
            idle: self.ticks_to_usec(ticks.idle),
            iowait: self.ticks_to_usec(ticks.iowait),
            irq: self.ticks_to_usec(ticks.irq),
            softirq: self.ticks_to_usec(ticks.softirq),
            steal: self.ticks_to_usec(ticks.steal),
        })
    }

    fn read_disk_counters(&self) -> HeadroomResult<HashMap<String, IoCounters>> {
        let path = self.paths.diskstats();
        parse_diskstats(&read(&path)?, &path)
    }
}

fn read(path: &Path) -> HeadroomResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to read procfs file");
        HeadroomError::Io(e)
    })
}

fn malformed(path: &Path, message: impl Into<String>) -> HeadroomError {
    HeadroomError::MalformedStats {
        source_file: path.display().to_string(),
        message: message.into(),
    }
}

/// Parse `/proc/meminfo` (values in kB).
fn parse_meminfo(content: &str, path: &Path) -> HeadroomResult<MemoryInfo> {
    let mut fields: HashMap<&str, u64> = HashMap::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if let Ok(kb) = value.parse::<u64>() {
                fields.insert(key.trim_end_matches(':'), kb.saturating_mul(1024));
            }
        }
    }

    let total_bytes = *fields
        .get("MemTotal")
        .ok_or_else(|| malformed(path, "missing MemTotal"))?;

    // Kernels before 3.14 do not export MemAvailable.
    let available_bytes = match fields.get("MemAvailable") {
        Some(available) => *available,
        None => ["MemFree", "Buffers", "Cached"]
            .iter()
            .filter_map(|key| fields.get(key))
            .sum(),
    };

    Ok(MemoryInfo {
        total_bytes,
        available_bytes,
    })
}

/// Parse the aggregate `cpu` line of `/proc/stat`, in clock ticks.
fn parse_stat_cpu_line(content: &str, path: &Path) -> HeadroomResult<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| malformed(path, "missing aggregate cpu line"))?;

    let values = line
        .split_whitespace()
        .skip(1)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(path, format!("invalid cpu field: {e}")))?;

    if values.len() < 4 {
        return Err(malformed(path, "cpu line has fewer than 4 fields"));
    }

    let field = |i: usize| values.get(i).copied().unwrap_or(0);
    Ok(CpuTimes {
        user: field(0),
        nice: field(1),
        system: field(2),
        idle: field(3),
        iowait: field(4),
        irq: field(5),
        softirq: field(6),
        steal: field(7),
    })
}

/// Parse `/proc/diskstats` into byte counters keyed by kernel name.
fn parse_diskstats(content: &str, path: &Path) -> HeadroomResult<HashMap<String, IoCounters>> {
    let mut counters = HashMap::new();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            return Err(malformed(path, format!("short line: {line:?}")));
        }

        let sectors = |i: usize| {
            parts[i]
                .parse::<u64>()
                .map_err(|e| malformed(path, format!("invalid field {i} for {}: {e}", parts[2])))
        };

        counters.insert(
            parts[2].to_string(),
            IoCounters::new(
                sectors(5)?.saturating_mul(SECTOR_SIZE),
                sectors(9)?.saturating_mul(SECTOR_SIZE),
            ),
        );
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16384000 kB\n\
                           MemFree:         1000000 kB\n\
                           MemAvailable:    8192000 kB\n\
                           Buffers:          100000 kB\n\
                           Cached:          2000000 kB\n";

    const STAT: &str = "cpu  1000 100 500 8000 200 50 50 100 0 0\n\
                        cpu0 500 50 250 4000 100 25 25 50 0 0\n\
                        intr 12345\n";

    const DISKSTATS: &str = "   8       0 sda 100 0 2048 10 50 0 4096 20 0 30 30\n\
                             8       1 sda1 10 0 8 1 0 0 0 0 0 1 1\n\
                           259       0 nvme0n1 1 0 1 0 1 0 1 0 0 0 0 0 0 0 0 0 0\n";

    fn fake_proc() -> (tempfile::TempDir, ProcSampler) {
        let temp = tempfile::tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path());
        std::fs::create_dir_all(&paths.proc_root).unwrap();
        std::fs::write(paths.meminfo(), MEMINFO).unwrap();
        std::fs::write(paths.stat(), STAT).unwrap();
        std::fs::write(paths.diskstats(), DISKSTATS).unwrap();
        (temp, ProcSampler::new(paths).with_clock_ticks(100))
    }

    #[test]
    fn reads_memory() {
        let (_temp, sampler) = fake_proc();
        let memory = sampler.read_memory().unwrap();
        assert_eq!(memory.total_bytes, 16_384_000 * 1024);
        assert_eq!(memory.available_bytes, 8_192_000 * 1024);
    }

    #[test]
    fn memory_without_memavailable() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 10 kB\nCached: 1 kB\n";
        let memory = parse_meminfo(content, Path::new("meminfo")).unwrap();
        assert_eq!(memory.available_bytes, 111 * 1024);
    }

    #[test]
    fn reads_cpu_times_in_usec() {
        let (_temp, sampler) = fake_proc();
        let cpu = sampler.read_cpu_times().unwrap();
        // 100 ticks per second: one tick is 10ms.
        assert_eq!(cpu.user, 10_000_000);
        assert_eq!(cpu.idle, 80_000_000);
        assert_eq!(cpu.steal, 1_000_000);
        assert_eq!(cpu.total(), 100_000_000);
    }

    #[test]
    fn reads_disk_counters() {
        let (_temp, sampler) = fake_proc();
        let disks = sampler.read_disk_counters().unwrap();
        assert_eq!(disks.len(), 3);
        assert_eq!(disks["sda"], IoCounters::new(2048 * 512, 4096 * 512));
        assert_eq!(disks["sda1"].write_bytes, 0);
    }

    #[test]
    fn snapshot_combines_sources() {
        let (_temp, sampler) = fake_proc();
        let snapshot = sampler.snapshot().unwrap();
        assert_eq!(snapshot.memory.total_bytes, 16_384_000 * 1024);
        assert!(snapshot.disks.contains_key("nvme0n1"));
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(parse_meminfo("MemFree: 1 kB\n", Path::new("meminfo")).is_err());
        assert!(parse_stat_cpu_line("intr 1\n", Path::new("stat")).is_err());
        assert!(parse_stat_cpu_line("cpu  1 x 3 4\n", Path::new("stat")).is_err());
        assert!(parse_diskstats("8 0 sda 1\n", Path::new("diskstats")).is_err());
    }

    #[test]
    fn missing_proc_is_an_error() {
        let sampler = ProcSampler::new(HostPaths::with_root("/nonexistent/headroom"));
        assert!(matches!(sampler.read_memory(), Err(HeadroomError::Io(_))));
    }
}

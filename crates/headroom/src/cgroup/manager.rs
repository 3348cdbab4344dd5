//! Cgroup manager implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use headroom_common::{HeadroomError, HeadroomResult, HostPaths, ScopeName};
use parking_lot::Mutex;

use super::stats::{parse_cpu_usage, parse_io_stat, parse_limit, parse_value};
use super::{CgroupSnapshot, CpuMax, IoLimit, ResourceController, ResourceLimits};
use crate::device::{DeviceNumber, IoDirection};

/// Manages the cgroup of the governed process.
#[derive(Debug)]
pub struct CgroupManager {
    /// Scope name.
    scope: ScopeName,
    /// Cgroup path.
    path: PathBuf,
    /// Whether we created this cgroup.
    created: bool,
    /// Device/direction pairs that currently carry an `io.max` byte limit.
    io_limited: Mutex<BTreeSet<(DeviceNumber, IoDirection)>>,
}

impl CgroupManager {
    /// Create a new cgroup directly under the cgroup root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(scope: &ScopeName, paths: &HostPaths) -> HeadroomResult<Self> {
        let path = paths.scope(scope.as_str());

        tracing::debug!(
            scope = %scope,
            path = %path.display(),
            "Creating cgroup"
        );

        std::fs::create_dir(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => HeadroomError::PermissionDenied {
                operation: "create cgroup".to_string(),
            },
            std::io::ErrorKind::AlreadyExists => HeadroomError::Cgroup {
                scope: scope.to_string(),
                message: format!("{} already exists", path.display()),
            },
            _ => HeadroomError::Io(e),
        })?;

        Ok(Self {
            scope: scope.clone(),
            path,
            created: true,
            io_limited: Mutex::new(BTreeSet::new()),
        })
    }

    /// Get the cgroup path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the scope name.
    #[must_use]
    pub fn scope(&self) -> &ScopeName {
        &self.scope
    }

    /// Delegate controllers to this cgroup via the parent's `cgroup.subtree_control`.
    ///
    /// Controllers already enabled are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent's subtree control cannot be updated.
    pub fn enable_controllers(&self, controllers: &[&str]) -> HeadroomResult<()> {
        let parent = self.path.parent().ok_or_else(|| HeadroomError::Internal {
            message: format!("cgroup {} has no parent", self.path.display()),
        })?;
        let subtree_control = parent.join("cgroup.subtree_control");

        let current = std::fs::read_to_string(&subtree_control).unwrap_or_default();
        let enabled: BTreeSet<&str> = current.split_whitespace().collect();

        let missing: Vec<String> = controllers
            .iter()
            .filter(|c| !enabled.contains(*c))
            .map(|c| format!("+{c}"))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        std::fs::write(&subtree_control, missing.join(" ")).map_err(|e| HeadroomError::Cgroup {
            scope: self.scope.to_string(),
            message: format!("failed to enable controllers {missing:?}: {e}"),
        })?;

        tracing::debug!(scope = %self.scope, controllers = ?missing, "Enabled controllers");
        Ok(())
    }

    /// Add a process to the cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if `cgroup.procs` cannot be written.
    pub fn attach(&self, pid: u32) -> HeadroomResult<()> {
        self.write("cgroup.procs", &pid.to_string())?;

        tracing::debug!(
            scope = %self.scope,
            pid = pid,
            "Added process to cgroup"
        );

        Ok(())
    }

    /// Delete the cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed, e.g. because
    /// processes are still attached.
    pub fn destroy(&self) -> HeadroomResult<()> {
        if self.created && self.path.exists() {
            std::fs::remove_dir(&self.path).map_err(|e| HeadroomError::Cgroup {
                scope: self.scope.to_string(),
                message: format!("failed to remove {}: {e}", self.path.display()),
            })?;
            tracing::debug!(
                scope = %self.scope,
                path = %self.path.display(),
                "Deleted cgroup"
            );
        }
        Ok(())
    }

    fn read(&self, file: &str) -> HeadroomResult<String> {
        std::fs::read_to_string(self.path.join(file)).map_err(|e| HeadroomError::Cgroup {
            scope: self.scope.to_string(),
            message: format!("failed to read {file}: {e}"),
        })
    }

    fn write(&self, file: &str, value: &str) -> HeadroomResult<()> {
        std::fs::write(self.path.join(file), value).map_err(|e| HeadroomError::Cgroup {
            scope: self.scope.to_string(),
            message: format!("failed to write {value:?} to {file}: {e}"),
        })
    }

    /// Apply CPU limits.
    fn apply_cpu(&self, cpu: CpuMax) -> HeadroomResult<()> {
        // cpu.max format: "$quota $period"
        self.write("cpu.max", &format!("{} {}", cpu.quota_usec, cpu.period_usec))?;
        tracing::debug!(quota = cpu.quota_usec, period = cpu.period_usec, "Set CPU quota");
        Ok(())
    }

    /// Apply memory limits.
    fn apply_memory(&self, max: u64) -> HeadroomResult<()> {
        self.write("memory.max", &max.to_string())?;
        tracing::debug!(max, "Set memory.max");
        Ok(())
    }

    /// Apply I/O limits.
    ///
    /// A device/direction limited on an earlier call but absent from `limits`
    /// is lifted back to `max`.
    fn apply_io(&self, limits: &[IoLimit]) -> HeadroomResult<()> {
        let mut io_limited = self.io_limited.lock();
        let wanted: BTreeSet<(DeviceNumber, IoDirection)> =
            limits.iter().map(|l| (l.device, l.direction)).collect();

        // Format: "MAJOR:MINOR rbps=LIMIT" / "MAJOR:MINOR wbps=max"
        for (device, direction) in io_limited.difference(&wanted) {
            self.write("io.max", &format!("{device} {}=max", direction.bps_key()))?;
            tracing::debug!(%device, %direction, "Lifted io.max limit");
        }

        for limit in limits {
            let value = format!(
                "{} {}={}",
                limit.device,
                limit.direction.bps_key(),
                limit.bytes_per_second
            );
            self.write("io.max", &value)?;
            tracing::debug!(
                device = %limit.device,
                direction = %limit.direction,
                bps = limit.bytes_per_second,
                "Set io.max"
            );
        }

        *io_limited = wanted;
        Ok(())
    }
}

impl ResourceController for CgroupManager {
    fn read_stats(&self) -> HeadroomResult<CgroupSnapshot> {
        Ok(CgroupSnapshot {
            memory_ceiling: parse_limit(&self.read("memory.max")?, "memory.max")?,
            memory_current: parse_value(&self.read("memory.current")?, "memory.current")?,
            cpu_usage_usec: parse_cpu_usage(&self.read("cpu.stat")?)?,
            io: parse_io_stat(&self.read("io.stat")?)?,
        })
    }

    fn apply_limits(&self, limits: &ResourceLimits) -> HeadroomResult<()> {
        if let Some(max) = limits.memory_max {
            self.apply_memory(max)?;
        }

        if let Some(cpu) = limits.cpu {
            self.apply_cpu(cpu)?;
        }

        self.apply_io(&limits.io)
    }
}

//! Host filesystem roots read and written by headroom.

use std::path::{Path, PathBuf};

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default cgroup v2 mount point.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Filesystem roots for kernel interfaces.
///
/// Both roots can be redirected, which lets tests run against a fake tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// procfs root (default: /proc).
    pub proc_root: PathBuf,
    /// cgroup v2 root (default: /sys/fs/cgroup).
    pub cgroup_root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
        }
    }
}

impl HostPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place both roots under a single directory (`<root>/proc`, `<root>/cgroup`).
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            proc_root: root.join("proc"),
            cgroup_root: root.join("cgroup"),
        }
    }

    /// Override the procfs root.
    #[must_use]
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Override the cgroup root.
    #[must_use]
    pub fn with_cgroup_root(mut self, cgroup_root: impl Into<PathBuf>) -> Self {
        self.cgroup_root = cgroup_root.into();
        self
    }

    /// `/proc/meminfo`.
    #[must_use]
    pub fn meminfo(&self) -> PathBuf {
        self.proc_root.join("meminfo")
    }

    /// `/proc/stat`.
    #[must_use]
    pub fn stat(&self) -> PathBuf {
        self.proc_root.join("stat")
    }

    /// `/proc/diskstats`.
    #[must_use]
    pub fn diskstats(&self) -> PathBuf {
        self.proc_root.join("diskstats")
    }

    /// Directory of a scope under the cgroup root.
    #[must_use]
    pub fn scope(&self, name: &str) -> PathBuf {
        self.cgroup_root.join(name)
    }
}

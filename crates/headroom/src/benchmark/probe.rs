//! Throughput probes backed by `hdparm` and `dd`.

use std::path::{Path, PathBuf};
use std::process::Command;

use headroom_common::scope::scratch_file_name;
use headroom_common::{ByteRate, HeadroomError, HeadroomResult};

use super::ThroughputProbe;
use crate::device::DeviceDescriptor;

/// `dd` block size and count: 80 MiB per write measurement.
const DD_BLOCK_SIZE: &str = "8k";
const DD_BLOCK_COUNT: &str = "10k";

/// Measures devices with external tools.
///
/// The write probe mounts the device under test, so it only runs when a
/// scratch directory is given, and never against a device that is already
/// mounted or carries no filesystem.
#[derive(Debug, Clone, Default)]
pub struct ToolProbe {
    scratch_dir: Option<PathBuf>,
}

impl ToolProbe {
    /// Create a probe that only measures reads.
    #[must_use]
    pub const fn read_only() -> Self {
        Self { scratch_dir: None }
    }

    /// Create a probe that also measures writes, mounting devices at `scratch_dir`.
    #[must_use]
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(scratch_dir.into()),
        }
    }

    /// The mount point used for write measurements.
    #[must_use]
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch_dir.as_deref()
    }

    fn measure_write(
        &self,
        device: &DeviceDescriptor,
        scratch_dir: &Path,
        fs_type: &str,
    ) -> HeadroomResult<ByteRate> {
        mount_device(device, scratch_dir, fs_type)?;

        let target = scratch_dir.join(scratch_file_name());
        let result = run_dd(&target);

        if let Err(e) = std::fs::remove_file(&target) {
            tracing::warn!(path = %target.display(), error = %e, "Failed to remove benchmark file");
        }
        if let Err(e) = rustix::mount::unmount(scratch_dir, rustix::mount::UnmountFlags::empty()) {
            tracing::warn!(
                device = %device.kernel_name,
                target = %scratch_dir.display(),
                error = %e,
                "Failed to unmount benchmark device"
            );
        }

        result
    }
}

impl ThroughputProbe for ToolProbe {
    fn read_throughput(&self, device: &DeviceDescriptor) -> Option<ByteRate> {
        let dev_path = device.dev_path();

        let output = Command::new("hdparm")
            .args(["-t", &dev_path])
            .output()
            .map_err(|e| tracing::debug!(device = %dev_path, error = %e, "Failed to execute hdparm"))
            .ok()?;

        if !output.status.success() {
            tracing::debug!(device = %dev_path, status = %output.status, "hdparm failed");
            return None;
        }

        ByteRate::parse_tool_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| tracing::debug!(device = %dev_path, error = %e, "Unparsable hdparm output"))
            .ok()
    }

    fn write_throughput(&self, device: &DeviceDescriptor) -> Option<ByteRate> {
        let scratch_dir = self.scratch_dir.as_deref()?;

        if device.is_mounted() {
            tracing::debug!(
                device = %device.kernel_name,
                mount_point = ?device.mount_point,
                "Skipping write benchmark on mounted device"
            );
            return None;
        }
        let Some(fs_type) = device.fs_type.as_deref() else {
            tracing::debug!(device = %device.kernel_name, "Skipping write benchmark: no filesystem");
            return None;
        };

        self.measure_write(device, scratch_dir, fs_type)
            .map_err(|e| {
                tracing::warn!(device = %device.kernel_name, error = %e, "Write benchmark failed");
            })
            .ok()
    }
}

/// Mount `device` at `target`.
fn mount_device(device: &DeviceDescriptor, target: &Path, fs_type: &str) -> HeadroomResult<()> {
    use rustix::mount::{MountFlags, mount};

    let dev_path = device.dev_path();
    tracing::debug!(
        source = %dev_path,
        target = %target.display(),
        fs_type,
        "Mounting device for write benchmark"
    );

    let fs_type_c = std::ffi::CString::new(fs_type).map_err(|e| HeadroomError::Internal {
        message: format!("invalid filesystem type {fs_type:?}: {e}"),
    })?;

    mount(
        Path::new(&dev_path),
        target,
        fs_type_c.as_c_str(),
        MountFlags::NOSUID | MountFlags::NODEV | MountFlags::NOEXEC,
        c"",
    )
    .map_err(|e| HeadroomError::Io(e.into()))
}

/// Write zeros to `target` and return the rate `dd` reports.
fn run_dd(target: &Path) -> HeadroomResult<ByteRate> {
    let output = Command::new("dd")
        .arg("if=/dev/zero")
        .arg(format!("of={}", target.display()))
        .arg(format!("bs={DD_BLOCK_SIZE}"))
        .arg(format!("count={DD_BLOCK_COUNT}"))
        .arg("conv=fdatasync")
        .output()
        .map_err(|e| HeadroomError::Process {
            command: "dd".to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(HeadroomError::Process {
            command: "dd".to_string(),
            message: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    // dd reports on stderr: "... copied, 0.52 s, 161 MB/s"
    ByteRate::parse_tool_output(&String::from_utf8_lossy(&output.stderr))
}

//! Physical disk catalog built from `lsblk`.

use std::collections::BTreeMap;
use std::process::Command;

use headroom_common::{HeadroomError, HeadroomResult};
use serde::{Deserialize, Serialize};

use super::{DeviceNumber, parse_device_number};

/// `lsblk` columns requested at startup.
const LSBLK_COLUMNS: &str = "NAME,KNAME,MAJ:MIN,TYPE,FSTYPE,MOUNTPOINT";

/// Raw `lsblk -J` document.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

/// Raw `lsblk -J` device node.
#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    kname: String,
    #[serde(rename = "maj:min")]
    maj_min: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// A block device and its partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Display name (e.g. `nvme0n1p1`, or a mapper name).
    pub name: String,
    /// Kernel name (e.g. `sda`, `dm-0`); benchmark results are keyed by it.
    pub kernel_name: String,
    /// Device number.
    pub number: DeviceNumber,
    /// Whether lsblk reports the node as a whole disk.
    pub is_physical_disk: bool,
    /// Filesystem type, if the node carries one.
    pub fs_type: Option<String>,
    /// Where the node is currently mounted, if anywhere.
    pub mount_point: Option<String>,
    /// Child nodes (partitions, holders), in lsblk order.
    pub children: Vec<DeviceDescriptor>,
}

impl DeviceDescriptor {
    /// Device node path under `/dev`.
    #[must_use]
    pub fn dev_path(&self) -> String {
        format!("/dev/{}", self.kernel_name)
    }

    /// Whether the node backs a live filesystem.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mount_point.as_deref().is_some_and(|m| !m.is_empty())
    }

    fn from_lsblk(raw: LsblkDevice) -> HeadroomResult<Self> {
        let number = parse_device_number(&raw.maj_min, "lsblk")?;
        let children = raw
            .children
            .into_iter()
            .map(Self::from_lsblk)
            .collect::<HeadroomResult<Vec<_>>>()?;

        Ok(Self {
            name: raw.name,
            kernel_name: raw.kname,
            number,
            is_physical_disk: raw.kind == "disk",
            fs_type: raw.fstype.filter(|s| !s.is_empty()),
            mount_point: raw.mountpoint.filter(|s| !s.is_empty()),
            children,
        })
    }
}

/// The physical disks of the host, keyed by kernel name.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    disks: BTreeMap<String, DeviceDescriptor>,
}

impl DeviceCatalog {
    /// Enumerate block devices by running `lsblk`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lsblk` cannot be run or its output is unusable.
    pub fn discover() -> HeadroomResult<Self> {
        tracing::debug!(columns = LSBLK_COLUMNS, "Enumerating block devices");

        let output = Command::new("lsblk")
            .args(["-J", "-a", "-o", LSBLK_COLUMNS])
            .output()
            .map_err(|e| HeadroomError::DeviceEnumeration {
                message: format!("failed to run lsblk: {e}"),
            })?;

        if !output.status.success() {
            return Err(HeadroomError::DeviceEnumeration {
                message: format!(
                    "lsblk exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let catalog = Self::from_lsblk_json(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!(
            disks = ?catalog.disks.keys().collect::<Vec<_>>(),
            "Discovered physical disks"
        );
        Ok(catalog)
    }

    /// Build the catalog from `lsblk -J` output.
    ///
    /// Only top-level nodes of type `disk` are kept; their partitions stay
    /// attached as children.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_lsblk_json(json: &str) -> HeadroomResult<Self> {
        let output: LsblkOutput =
            serde_json::from_str(json).map_err(|e| HeadroomError::DeviceEnumeration {
                message: format!("invalid lsblk output: {e}"),
            })?;

        let disks = output
            .blockdevices
            .into_iter()
            .map(DeviceDescriptor::from_lsblk)
            .filter(|device| device.as_ref().map_or(true, |d| d.is_physical_disk))
            .map(|device| device.map(|d| (d.kernel_name.clone(), d)))
            .collect::<HeadroomResult<BTreeMap<_, _>>>()?;

        Ok(Self { disks })
    }

    /// Build a catalog from already-known disks.
    #[must_use]
    pub fn from_disks(disks: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        Self {
            disks: disks
                .into_iter()
                .filter(|d| d.is_physical_disk)
                .map(|d| (d.kernel_name.clone(), d))
                .collect(),
        }
    }

    /// Look up a disk by kernel name.
    #[must_use]
    pub fn get(&self, kernel_name: &str) -> Option<&DeviceDescriptor> {
        self.disks.get(kernel_name)
    }

    /// Iterate over the physical disks.
    pub fn disks(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.disks.values()
    }

    /// Number of physical disks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    /// Whether no physical disk was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }
}

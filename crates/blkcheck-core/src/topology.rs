//! Expected device layout and the paths the driver exposes.

use serde::Serialize;
use std::path::{Path, PathBuf};

pub const SECTOR_SIZE: u64 = 512;
pub const MIB: u64 = 1024 * 1024;
pub const PARTITION_COUNT: usize = 3;
pub const PARTITION_SIZE: u64 = 100 * MIB;
/// Boot-sector-style header ahead of partition data on the whole-device view.
pub const HEADER_SIZE: u64 = SECTOR_SIZE;
pub const DEFAULT_DEVICE_NAME: &str = "ex_blk";

/// Filesystem roots the driver's artifacts hang off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRoots {
    pub dev: PathBuf,
    pub proc: PathBuf,
    pub sys_class: PathBuf,
    pub sys_module: PathBuf,
    pub mnt: PathBuf,
}

impl Default for PathRoots {
    fn default() -> Self {
        Self {
            dev: PathBuf::from("/dev"),
            proc: PathBuf::from("/proc"),
            sys_class: PathBuf::from("/sys/class"),
            sys_module: PathBuf::from("/sys/module"),
            mnt: PathBuf::from("/mnt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTopology {
    pub name: String,
    pub device: PathBuf,
    pub partitions: Vec<PathBuf>,
    pub proc_attr: PathBuf,
    pub sysfs_attr: PathBuf,
    pub mount_root: PathBuf,
    pub total_size: u64,
    pub partition_size: u64,
}

impl DeviceTopology {
    pub fn new(name: &str, roots: &PathRoots) -> Self {
        let device = roots.dev.join(name);
        let partitions = (1..=PARTITION_COUNT)
            .map(|i| roots.dev.join(format!("{name}{i}")))
            .collect();
        Self {
            name: name.to_string(),
            device,
            partitions,
            proc_attr: roots.proc.join(name).join("capacity"),
            sysfs_attr: roots.sys_class.join(name).join(name).join("capacity"),
            mount_root: roots.mnt.clone(),
            total_size: HEADER_SIZE + PARTITION_COUNT as u64 * PARTITION_SIZE,
            partition_size: PARTITION_SIZE,
        }
    }

    pub fn partition(&self, index: usize) -> Option<&Path> {
        index
            .checked_sub(1)
            .and_then(|i| self.partitions.get(i))
            .map(PathBuf::as_path)
    }

    /// Mount point for partition `index`, or for the whole device when 0.
    pub fn mount_point(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.mount_root.join(&self.name)
        } else {
            self.mount_root.join(format!("{}{}", self.name, index))
        }
    }

    /// Whole device followed by every partition, paired with its mount point.
    pub fn mount_targets(&self) -> Vec<(PathBuf, PathBuf)> {
        std::iter::once(self.device.clone())
            .chain(self.partitions.iter().cloned())
            .enumerate()
            .map(|(i, dev)| (dev, self.mount_point(i)))
            .collect()
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_size / SECTOR_SIZE
    }

    /// A sector index well past the end of the device.
    pub fn far_sector(&self) -> u64 {
        (self.total_sectors() * 2).max(1_000_000)
    }

    /// Size in MiB of a write guaranteed to overrun the device.
    pub fn overflow_mib(&self) -> u64 {
        self.total_size / MIB + 100
    }
}

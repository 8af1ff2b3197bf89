//! Block-device identity via sysfs: kernel name, partition number, parent disk.

use std::path::{Path, PathBuf};

use crate::core::errors::{EmbError, Result};
use crate::platform::pal::Platform;

const SYS_CLASS_BLOCK: &str = "/sys/class/block";

/// What kind of node a block device is, as far as growing it is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Device-mapper node owned by LVM.
    LvmLogicalVolume,
    /// Device-mapper node owned by something else (crypt, multipath, ...).
    OtherDeviceMapper { dm_uuid: String },
    /// Partition `number` of the whole disk `disk`.
    Partition { disk: String, number: u32 },
    /// Whole disk; grown by the hypervisor, nothing to do here.
    WholeDisk,
}

/// A resolved block device node such as `/dev/sda2` or `/dev/dm-0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Path as it was given (`/dev/mapper/vg0-root`).
    pub path: PathBuf,
    /// Kernel name (`dm-0`, `sda2`, `nvme0n1p1`).
    pub name: String,
}

impl BlockDevice {
    /// Resolve symlinks under `/dev` to the kernel device name.
    pub fn resolve(platform: &dyn Platform, path: &Path) -> Result<Self> {
        let canonical = platform.canonicalize(path)?;
        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EmbError::UnsupportedLayer {
                layer: path.display().to_string(),
                details: "device path has no kernel name".to_string(),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            name,
        })
    }

    /// `/sys/class/block/<name>`.
    #[must_use]
    pub fn sysfs_dir(&self) -> PathBuf {
        Path::new(SYS_CLASS_BLOCK).join(&self.name)
    }

    /// `/dev/<name>`.
    #[must_use]
    pub fn dev_node(&self) -> PathBuf {
        Path::new("/dev").join(&self.name)
    }

    /// Size in 512-byte sectors, as sysfs reports it.
    pub fn size_sectors(&self, platform: &dyn Platform) -> Result<u64> {
        let attr = self.sysfs_dir().join("size");
        let raw = platform.read_attr(&attr)?;
        raw.parse::<u64>().map_err(|error| EmbError::ToolOutput {
            program: attr.display().to_string(),
            details: format!("invalid sector count {raw:?}: {error}"),
        })
    }

    pub fn kind(&self, platform: &dyn Platform) -> Result<DeviceKind> {
        let sysfs = self.sysfs_dir();

        let dm_uuid_attr = sysfs.join("dm").join("uuid");
        if platform.exists(&dm_uuid_attr) {
            let dm_uuid = platform.read_attr(&dm_uuid_attr)?;
            if dm_uuid.starts_with("LVM-") {
                return Ok(DeviceKind::LvmLogicalVolume);
            }
            return Ok(DeviceKind::OtherDeviceMapper { dm_uuid });
        }

        let partition_attr = sysfs.join("partition");
        if platform.exists(&partition_attr) {
            let raw = platform.read_attr(&partition_attr)?;
            let number = raw.parse::<u32>().map_err(|error| EmbError::ToolOutput {
                program: partition_attr.display().to_string(),
                details: format!("invalid partition number {raw:?}: {error}"),
            })?;
            // /sys/class/block/sda2 -> /sys/devices/.../block/sda/sda2
            let real = platform.canonicalize(&sysfs)?;
            let disk = real
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| EmbError::UnsupportedLayer {
                    layer: self.path.display().to_string(),
                    details: format!("cannot find parent disk of {}", real.display()),
                })?;
            return Ok(DeviceKind::Partition { disk, number });
        }

        Ok(DeviceKind::WholeDisk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::MockPlatform;

    #[test]
    fn resolves_mapper_symlink_to_kernel_name() {
        let mock = MockPlatform::new(Vec::new()).with_link("/dev/mapper/vg0-root", "/dev/dm-0");
        let dev = BlockDevice::resolve(&mock, Path::new("/dev/mapper/vg0-root")).expect("resolve");
        assert_eq!(dev.name, "dm-0");
        assert_eq!(dev.path, Path::new("/dev/mapper/vg0-root"));
        assert_eq!(dev.dev_node(), Path::new("/dev/dm-0"));
    }

    #[test]
    fn classifies_lvm_and_foreign_device_mapper() {
        let mock = MockPlatform::new(Vec::new())
            .with_attr("/sys/class/block/dm-0/dm/uuid", "LVM-abcdef")
            .with_attr("/sys/class/block/dm-1/dm/uuid", "CRYPT-LUKS2-1234");
        let lv = BlockDevice::resolve(&mock, Path::new("/dev/dm-0")).expect("resolve");
        assert_eq!(lv.kind(&mock).expect("kind"), DeviceKind::LvmLogicalVolume);
        let crypt = BlockDevice::resolve(&mock, Path::new("/dev/dm-1")).expect("resolve");
        assert!(matches!(
            crypt.kind(&mock).expect("kind"),
            DeviceKind::OtherDeviceMapper { .. }
        ));
    }

    #[test]
    fn classifies_partition_with_parent_disk() {
        let mock = MockPlatform::new(Vec::new())
            .with_attr("/sys/class/block/nvme0n1p3/partition", "3")
            .with_link(
                "/sys/class/block/nvme0n1p3",
                "/sys/devices/pci0000:00/0000:00:04.0/nvme/nvme0/nvme0n1/nvme0n1p3",
            );
        let dev = BlockDevice::resolve(&mock, Path::new("/dev/nvme0n1p3")).expect("resolve");
        assert_eq!(
            dev.kind(&mock).expect("kind"),
            DeviceKind::Partition {
                disk: "nvme0n1".to_string(),
                number: 3
            }
        );
    }

    #[test]
    fn whole_disk_has_no_markers() {
        let mock = MockPlatform::new(Vec::new());
        let dev = BlockDevice::resolve(&mock, Path::new("/dev/vdb")).expect("resolve");
        assert_eq!(dev.kind(&mock).expect("kind"), DeviceKind::WholeDisk);
    }

    #[test]
    fn size_reads_sector_count() {
        let mock = MockPlatform::new(Vec::new()).with_attr("/sys/class/block/sda1/size", "2048");
        let dev = BlockDevice::resolve(&mock, Path::new("/dev/sda1")).expect("resolve");
        assert_eq!(dev.size_sectors(&mock).expect("size"), 2048);
    }
}

//! Linux chain resolver: mount table -> filesystem -> (LVM LV -> PV) -> partition.

use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{EmbError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::platform::pal::{Platform, find_exact_mount};
use crate::resize::resizer::Resizer;
use crate::resolver::ChainResolver;
use crate::resolver::blockdev::{BlockDevice, DeviceKind};
use crate::resolver::filesystem::FilesystemResizer;
use crate::resolver::lvm::LogicalVolumeResizer;
use crate::resolver::partition::PartitionResizer;

/// Builds chains from the live system through a [`Platform`].
#[derive(Clone)]
pub struct SystemChainResolver {
    platform: Arc<dyn Platform>,
}

impl SystemChainResolver {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }
}

impl ChainResolver for SystemChainResolver {
    fn resolve(&self, mount_point: &Path) -> Result<Box<dyn Resizer>> {
        let mount_point = resolve_absolute_path(mount_point, self.platform.as_ref());
        let mounts = self.platform.mount_points()?;
        let mount = find_exact_mount(&mount_point, &mounts).ok_or_else(|| {
            EmbError::MountNotFound {
                path: mount_point.clone(),
            }
        })?;
        let fs = FilesystemResizer::new(
            Arc::clone(&self.platform),
            &mount.fs_type,
            mount.path.clone(),
            mount.device.clone().into(),
        )?;
        Ok(Box::new(fs))
    }
}

/// The resizer for whatever block device backs a filesystem or PV, or `None`
/// when the device is a whole disk.
pub fn device_resizer(
    platform: &Arc<dyn Platform>,
    device: &Path,
) -> Result<Option<Box<dyn Resizer>>> {
    let dev = BlockDevice::resolve(platform.as_ref(), device)?;
    match dev.kind(platform.as_ref())? {
        DeviceKind::LvmLogicalVolume => Ok(Some(Box::new(LogicalVolumeResizer::probe(
            Arc::clone(platform),
            device,
        )?))),
        DeviceKind::Partition { disk, number } => Ok(Some(Box::new(PartitionResizer::new(
            Arc::clone(platform),
            dev,
            disk,
            number,
        )))),
        DeviceKind::WholeDisk => Ok(None),
        DeviceKind::OtherDeviceMapper { dm_uuid } => Err(EmbError::UnsupportedLayer {
            layer: device.display().to_string(),
            details: format!("device-mapper target {dm_uuid} is not LVM"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{CommandOutput, FsStats, MockPlatform, MountPoint};

    fn root_mount(device: &str, fs_type: &str) -> MockPlatform {
        MockPlatform::new(vec![
            MountPoint {
                path: "/".into(),
                device: device.to_string(),
                fs_type: fs_type.to_string(),
            },
            MountPoint {
                path: "/proc".into(),
                device: "proc".to_string(),
                fs_type: "proc".to_string(),
            },
        ])
        .with_stats(FsStats {
            total_blocks: 100,
            fs_type: fs_type.to_string(),
            mount_point: "/".into(),
        })
    }

    fn chain_descriptions(top: Box<dyn Resizer>) -> Vec<String> {
        let mut out = vec![top.describe()];
        let mut current = top.dependency().expect("dependency");
        while let Some(resizer) = current {
            out.push(resizer.describe());
            current = resizer.dependency().expect("dependency");
        }
        out
    }

    #[test]
    fn resolves_lvm_on_partition_chain() {
        let mock = root_mount("/dev/mapper/vg0-root", "ext4")
            .with_link("/dev/mapper/vg0-root", "/dev/dm-0")
            .with_attr("/sys/class/block/dm-0/dm/uuid", "LVM-xyz")
            .with_attr("/sys/class/block/sda2/partition", "2")
            .with_link(
                "/sys/class/block/sda2",
                "/sys/devices/pci0000:00/0000:00:10.0/host0/target0:0:0/0:0:0:0/block/sda/sda2",
            )
            .with_command(
                "lvs --noheadings --units b --nosuffix --separator \t -o vg_name,lv_path /dev/mapper/vg0-root",
                CommandOutput::ok("  vg0\t/dev/vg0/root\n"),
            )
            .with_command(
                "pvs --noheadings --units b --nosuffix --separator \t -o pv_name,vg_name",
                CommandOutput::ok("  /dev/sda2\tvg0\n"),
            );
        let resolver = SystemChainResolver::new(Arc::new(mock));

        let top = resolver.resolve(Path::new("/")).expect("resolve");

        assert_eq!(
            chain_descriptions(top),
            vec![
                "ext4 filesystem at /",
                "LVM LV /dev/vg0/root",
                "LVM PV /dev/sda2",
                "partition /dev/sda2 (#2 of /dev/sda)",
            ]
        );
    }

    #[test]
    fn resolves_plain_partition_chain() {
        let mock = root_mount("/dev/vda1", "xfs")
            .with_attr("/sys/class/block/vda1/partition", "1")
            .with_link("/sys/class/block/vda1", "/sys/devices/virtio1/block/vda/vda1");
        let resolver = SystemChainResolver::new(Arc::new(mock));

        let top = resolver.resolve(Path::new("/")).expect("resolve");

        assert_eq!(
            chain_descriptions(top),
            vec!["xfs filesystem at /", "partition /dev/vda1 (#1 of /dev/vda)"]
        );
    }

    #[test]
    fn symlinked_argument_resolves_to_its_mount() {
        let mock = root_mount("/dev/vda1", "xfs")
            .with_link("/srv/root-alias", "/")
            .with_attr("/sys/class/block/vda1/partition", "1")
            .with_link("/sys/class/block/vda1", "/sys/devices/virtio1/block/vda/vda1");
        let resolver = SystemChainResolver::new(Arc::new(mock));

        let top = resolver
            .resolve(Path::new("/srv/root-alias"))
            .expect("alias resolves");

        assert_eq!(top.describe(), "xfs filesystem at /");
    }

    #[test]
    fn non_mount_point_is_rejected() {
        let resolver = SystemChainResolver::new(Arc::new(root_mount("/dev/vda1", "ext4")));
        let err = resolver
            .resolve(Path::new("/nonexistent-embiggen/dir"))
            .err()
            .expect("not a mount point");
        assert_eq!(err.code(), "EMB-2201");
    }

    #[test]
    fn crypt_device_is_unsupported() {
        let mock = root_mount("/dev/mapper/cryptroot", "ext4")
            .with_link("/dev/mapper/cryptroot", "/dev/dm-3")
            .with_attr("/sys/class/block/dm-3/dm/uuid", "CRYPT-LUKS2-abc");
        let resolver = SystemChainResolver::new(Arc::new(mock));
        let top = resolver.resolve(Path::new("/")).expect("filesystem resolves");
        let err = top.dependency().err().expect("crypt unsupported");
        assert_eq!(err.code(), "EMB-2202");
    }
}

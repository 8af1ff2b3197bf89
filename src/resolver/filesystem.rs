//! Filesystem layer: online growth of a mounted ext2/3/4 or XFS filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::errors::{EmbError, Result};
use crate::platform::pal::Platform;
use crate::resize::resizer::{ResizeMode, Resizer, ResizerState};
use crate::resolver::run_mutation;
use crate::resolver::system::device_resizer;

/// Filesystem families that support online growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    /// ext2/ext3/ext4, grown with `resize2fs <device>`.
    Ext,
    /// XFS, grown with `xfs_growfs <mount point>`.
    Xfs,
}

impl FsKind {
    /// Map a mount-table filesystem type; `None` when it cannot be grown.
    #[must_use]
    pub fn from_fs_type(fs_type: &str) -> Option<Self> {
        match fs_type {
            "ext2" | "ext3" | "ext4" => Some(Self::Ext),
            "xfs" => Some(Self::Xfs),
            _ => None,
        }
    }
}

pub struct FilesystemResizer {
    platform: Arc<dyn Platform>,
    kind: FsKind,
    fs_type: String,
    mount_point: PathBuf,
    device: PathBuf,
}

impl FilesystemResizer {
    pub fn new(
        platform: Arc<dyn Platform>,
        fs_type: &str,
        mount_point: PathBuf,
        device: PathBuf,
    ) -> Result<Self> {
        let kind = FsKind::from_fs_type(fs_type).ok_or_else(|| EmbError::UnsupportedLayer {
            layer: format!("{fs_type} filesystem at {}", mount_point.display()),
            details: "only ext2/ext3/ext4 and xfs can be grown online".to_string(),
        })?;
        Ok(Self {
            platform,
            kind,
            fs_type: fs_type.to_string(),
            mount_point,
            device,
        })
    }
}

impl Resizer for FilesystemResizer {
    fn describe(&self) -> String {
        format!("{} filesystem at {}", self.fs_type, self.mount_point.display())
    }

    fn state(&self) -> Result<ResizerState> {
        let stats = self.platform.fs_stats(&self.mount_point)?;
        Ok(ResizerState::new(format!("{} blocks", stats.total_blocks)))
    }

    fn resize(&self, mode: ResizeMode) -> Result<()> {
        // Both tools exit 0 and leave the filesystem untouched when it
        // already fills the device.
        let (program, target) = match self.kind {
            FsKind::Ext => ("resize2fs", self.device.to_string_lossy()),
            FsKind::Xfs => ("xfs_growfs", self.mount_point.to_string_lossy()),
        };
        match run_mutation(self.platform.as_ref(), mode, program, &[target.as_ref()])? {
            Some(output) => output.into_stdout(program).map(|_| ()),
            None => Ok(()),
        }
    }

    fn dependency(&self) -> Result<Option<Box<dyn Resizer>>> {
        device_resizer(&self.platform, &self.device)
    }
}

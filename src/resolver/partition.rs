//! Partition layer: grow the partition table entry into free space at the end
//! of the (already grown) disk with `growpart`.

use std::sync::Arc;

use crate::core::errors::Result;
use crate::platform::pal::Platform;
use crate::resize::resizer::{ResizeMode, Resizer, ResizerState};
use crate::resolver::blockdev::BlockDevice;
use crate::resolver::run_mutation;

/// `growpart` exits 1 and prints this when the partition already fills the disk.
const GROWPART_NOCHANGE: &str = "NOCHANGE";

pub struct PartitionResizer {
    platform: Arc<dyn Platform>,
    device: BlockDevice,
    disk: String,
    number: u32,
}

impl PartitionResizer {
    pub fn new(platform: Arc<dyn Platform>, device: BlockDevice, disk: String, number: u32) -> Self {
        Self {
            platform,
            device,
            disk,
            number,
        }
    }
}

impl Resizer for PartitionResizer {
    fn describe(&self) -> String {
        format!(
            "partition {} (#{} of /dev/{})",
            self.device.dev_node().display(),
            self.number,
            self.disk
        )
    }

    fn state(&self) -> Result<ResizerState> {
        let sectors = self.device.size_sectors(self.platform.as_ref())?;
        Ok(ResizerState::new(format!("{sectors} sectors")))
    }

    fn resize(&self, mode: ResizeMode) -> Result<()> {
        let disk = format!("/dev/{}", self.disk);
        let number = self.number.to_string();
        let Some(output) = run_mutation(
            self.platform.as_ref(),
            mode,
            "growpart",
            &[disk.as_str(), number.as_str()],
        )?
        else {
            return Ok(());
        };
        if output.exit_code == 1
            && (output.stdout.contains(GROWPART_NOCHANGE) || output.stderr.contains(GROWPART_NOCHANGE))
        {
            return Ok(());
        }
        output.into_stdout("growpart").map(|_| ())
    }

    fn dependency(&self) -> Result<Option<Box<dyn Resizer>>> {
        // The disk itself is grown by the hypervisor.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::platform::pal::{CommandOutput, MockPlatform, MockResponse};
    use crate::resize::chain::resize_chain;

    fn partition(mock: Arc<MockPlatform>) -> PartitionResizer {
        let device = BlockDevice::resolve(mock.as_ref(), Path::new("/dev/sda2")).expect("device");
        PartitionResizer::new(mock, device, "sda".to_string(), 2)
    }

    #[test]
    fn grows_partition_and_reports_sector_change() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_attr("/sys/class/block/sda2/size", "2048")
                .with_command(
                    "growpart /dev/sda 2",
                    MockResponse {
                        output: CommandOutput::ok("CHANGED: partition=2 start=2048"),
                        attr_writes: vec![("/sys/class/block/sda2/size".into(), "4096".to_string())],
                        stats_writes: Vec::new(),
                    },
                ),
        );
        let part = partition(Arc::clone(&mock));

        let changes = resize_chain(&part, ResizeMode::Apply)
            .into_result()
            .expect("resize");

        assert_eq!(
            changes[0].to_string(),
            "partition /dev/sda2 (#2 of /dev/sda): before: 2048 sectors, after: 4096 sectors"
        );
    }

    #[test]
    fn nochange_exit_is_idempotent_success() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_attr("/sys/class/block/sda2/size", "2048")
                .with_command(
                    "growpart /dev/sda 2",
                    CommandOutput {
                        exit_code: 1,
                        stdout: "NOCHANGE: partition 2 is size 2048. it cannot be grown".to_string(),
                        stderr: String::new(),
                    },
                ),
        );
        let part = partition(mock);
        assert!(part.resize(ResizeMode::Apply).is_ok());
    }

    #[test]
    fn real_growpart_failure_is_an_error() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command("growpart /dev/sda 2", CommandOutput::failed(2, "FAILED: sfdisk")),
        );
        let err = partition(mock)
            .resize(ResizeMode::Apply)
            .expect_err("exit 2 must fail");
        assert_eq!(err.code(), "EMB-2301");
    }

    #[test]
    fn dry_run_skips_growpart() {
        let mock = Arc::new(MockPlatform::new(Vec::new()));
        let part = partition(Arc::clone(&mock));
        part.resize(ResizeMode::DryRun).expect("dry-run");
        assert!(mock.calls().is_empty());
        assert!(part.dependency().expect("dependency").is_none());
    }
}

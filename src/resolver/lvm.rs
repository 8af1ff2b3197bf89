//! LVM layers: logical volume (`lvextend`) resting on a single physical
//! volume (`pvresize`), queried through the LVM report tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::{EmbError, Result};
use crate::platform::pal::Platform;
use crate::resize::resizer::{ResizeMode, Resizer, ResizerState};
use crate::resolver::system::device_resizer;
use crate::resolver::{parse_single_u64, run_mutation};

const REPORT_ARGS: [&str; 5] = ["--noheadings", "--units", "b", "--nosuffix", "--separator"];

fn report(platform: &dyn Platform, program: &str, fields: &str, target: &str) -> Result<String> {
    let mut args: Vec<&str> = REPORT_ARGS.to_vec();
    args.extend(["\t", "-o", fields]);
    if !target.is_empty() {
        args.push(target);
    }
    platform.run(program, &args)?.into_stdout(program)
}

fn parse_tabbed_line(line: &str) -> Vec<String> {
    line.split('\t')
        .map(|part| part.trim().to_string())
        .collect()
}

/// `(pv_name, vg_name)` rows from `pvs`; PVs outside any VG are skipped.
fn parse_pv_membership(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let cols = parse_tabbed_line(line);
            if cols.len() < 2 || cols[1].is_empty() {
                return None;
            }
            Some((cols[0].clone(), cols[1].clone()))
        })
        .collect()
}

/// An LVM logical volume, grown into all free extents of its volume group.
pub struct LogicalVolumeResizer {
    platform: Arc<dyn Platform>,
    lv_path: PathBuf,
    vg_name: String,
}

impl LogicalVolumeResizer {
    /// Look up the volume group owning `device` (any path naming the LV).
    pub fn probe(platform: Arc<dyn Platform>, device: &Path) -> Result<Self> {
        let device_arg = device.to_string_lossy();
        let out = report(platform.as_ref(), "lvs", "vg_name,lv_path", &device_arg)?;
        let cols = out
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(parse_tabbed_line)
            .filter(|cols| cols.len() >= 2 && !cols[0].is_empty())
            .ok_or_else(|| EmbError::ToolOutput {
                program: "lvs".to_string(),
                details: format!("no logical volume reported for {device_arg}"),
            })?;
        Ok(Self {
            platform,
            vg_name: cols[0].clone(),
            lv_path: PathBuf::from(&cols[1]),
        })
    }

    fn vg_free_bytes(&self) -> Result<u64> {
        let out = report(self.platform.as_ref(), "vgs", "vg_free", &self.vg_name)?;
        parse_single_u64("vgs", &out)
    }
}

impl Resizer for LogicalVolumeResizer {
    fn describe(&self) -> String {
        format!("LVM LV {}", self.lv_path.display())
    }

    fn state(&self) -> Result<ResizerState> {
        let out = report(
            self.platform.as_ref(),
            "lvs",
            "lv_size",
            &self.lv_path.to_string_lossy(),
        )?;
        let bytes = parse_single_u64("lvs", &out)?;
        Ok(ResizerState::new(format!("{bytes} bytes")))
    }

    fn resize(&self, mode: ResizeMode) -> Result<()> {
        // lvextend refuses a zero-extent extension; treat a full VG as done.
        if self.vg_free_bytes()? == 0 {
            return Ok(());
        }
        let lv_path = self.lv_path.to_string_lossy();
        match run_mutation(
            self.platform.as_ref(),
            mode,
            "lvextend",
            &["-l", "+100%FREE", lv_path.as_ref()],
        )? {
            Some(output) => output.into_stdout("lvextend").map(|_| ()),
            None => Ok(()),
        }
    }

    fn dependency(&self) -> Result<Option<Box<dyn Resizer>>> {
        let out = report(self.platform.as_ref(), "pvs", "pv_name,vg_name", "")?;
        let pvs: Vec<String> = parse_pv_membership(&out)
            .into_iter()
            .filter(|(_, vg)| *vg == self.vg_name)
            .map(|(pv, _)| pv)
            .collect();
        match pvs.as_slice() {
            [pv] => Ok(Some(Box::new(PhysicalVolumeResizer::new(
                Arc::clone(&self.platform),
                PathBuf::from(pv),
            )))),
            [] => Err(EmbError::ToolOutput {
                program: "pvs".to_string(),
                details: format!("volume group {} has no physical volumes", self.vg_name),
            }),
            many => Err(EmbError::UnsupportedLayer {
                layer: format!("LVM VG {}", self.vg_name),
                details: format!(
                    "{} physical volumes ({}); only single-PV groups can be grown",
                    many.len(),
                    many.join(", ")
                ),
            }),
        }
    }
}

/// An LVM physical volume, grown to fill its underlying device.
pub struct PhysicalVolumeResizer {
    platform: Arc<dyn Platform>,
    device: PathBuf,
}

impl PhysicalVolumeResizer {
    pub fn new(platform: Arc<dyn Platform>, device: PathBuf) -> Self {
        Self { platform, device }
    }
}

impl Resizer for PhysicalVolumeResizer {
    fn describe(&self) -> String {
        format!("LVM PV {}", self.device.display())
    }

    fn state(&self) -> Result<ResizerState> {
        let out = report(
            self.platform.as_ref(),
            "pvs",
            "pv_size",
            &self.device.to_string_lossy(),
        )?;
        let bytes = parse_single_u64("pvs", &out)?;
        Ok(ResizerState::new(format!("{bytes} bytes")))
    }

    fn resize(&self, mode: ResizeMode) -> Result<()> {
        let device = self.device.to_string_lossy();
        match run_mutation(self.platform.as_ref(), mode, "pvresize", &[device.as_ref()])? {
            Some(output) => output.into_stdout("pvresize").map(|_| ()),
            None => Ok(()),
        }
    }

    fn dependency(&self) -> Result<Option<Box<dyn Resizer>>> {
        device_resizer(&self.platform, &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{CommandOutput, MockPlatform};

    const LVS_PROBE: &str =
        "lvs --noheadings --units b --nosuffix --separator \t -o vg_name,lv_path /dev/mapper/vg0-root";
    const VGS_FREE: &str = "vgs --noheadings --units b --nosuffix --separator \t -o vg_free vg0";
    const PVS_MEMBERS: &str = "pvs --noheadings --units b --nosuffix --separator \t -o pv_name,vg_name";

    fn probe(mock: &Arc<MockPlatform>) -> LogicalVolumeResizer {
        let platform: Arc<dyn Platform> = Arc::clone(mock) as Arc<dyn Platform>;
        LogicalVolumeResizer::probe(platform, Path::new("/dev/mapper/vg0-root")).expect("probe")
    }

    #[test]
    fn parses_pv_membership_and_skips_orphans() {
        let rows = parse_pv_membership("  /dev/sda2\tvg0\n  /dev/sdb\t\n\n");
        assert_eq!(rows, vec![("/dev/sda2".to_string(), "vg0".to_string())]);
    }

    #[test]
    fn probe_reads_vg_and_lv_path() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command(LVS_PROBE, CommandOutput::ok("  vg0\t/dev/vg0/root\n")),
        );
        let lv = probe(&mock);
        assert_eq!(lv.describe(), "LVM LV /dev/vg0/root");
        assert_eq!(lv.vg_name, "vg0");
    }

    #[test]
    fn full_volume_group_makes_lvextend_a_noop() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command(LVS_PROBE, CommandOutput::ok("vg0\t/dev/vg0/root\n"))
                .with_command(VGS_FREE, CommandOutput::ok("  0\n")),
        );
        let lv = probe(&mock);
        lv.resize(ResizeMode::Apply).expect("noop");
        assert!(!mock.calls().iter().any(|c| c.starts_with("lvextend")));
    }

    #[test]
    fn free_extents_trigger_lvextend() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command(LVS_PROBE, CommandOutput::ok("vg0\t/dev/vg0/root\n"))
                .with_command(VGS_FREE, CommandOutput::ok("  4194304\n"))
                .with_command("lvextend -l +100%FREE /dev/vg0/root", CommandOutput::ok("")),
        );
        probe(&mock).resize(ResizeMode::Apply).expect("extend");
        assert!(
            mock.calls()
                .contains(&"lvextend -l +100%FREE /dev/vg0/root".to_string())
        );
    }

    #[test]
    fn multiple_physical_volumes_are_rejected() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command(LVS_PROBE, CommandOutput::ok("vg0\t/dev/vg0/root\n"))
                .with_command(
                    PVS_MEMBERS,
                    CommandOutput::ok("/dev/sda2\tvg0\n/dev/sdb1\tvg0\n/dev/sdc1\tvg1\n"),
                ),
        );
        let err = probe(&mock).dependency().expect_err("two PVs");
        assert_eq!(err.code(), "EMB-2202");
        assert!(err.to_string().contains("/dev/sda2, /dev/sdb1"));
    }

    #[test]
    fn single_physical_volume_becomes_dependency() {
        let mock = Arc::new(
            MockPlatform::new(Vec::new())
                .with_command(LVS_PROBE, CommandOutput::ok("vg0\t/dev/vg0/root\n"))
                .with_command(PVS_MEMBERS, CommandOutput::ok("/dev/sda2\tvg0\n")),
        );
        let dep = probe(&mock).dependency().expect("dep").expect("some");
        assert_eq!(dep.describe(), "LVM PV /dev/sda2");
    }

    #[test]
    fn pv_state_reports_bytes() {
        let mock = Arc::new(MockPlatform::new(Vec::new()).with_command(
            "pvs --noheadings --units b --nosuffix --separator \t -o pv_size /dev/sda2",
            CommandOutput::ok("  10737418240\n"),
        ));
        let pv = PhysicalVolumeResizer::new(mock, PathBuf::from("/dev/sda2"));
        assert_eq!(pv.state().expect("state").as_str(), "10737418240 bytes");
    }
}

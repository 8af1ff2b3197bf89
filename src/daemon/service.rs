//! Service integration: install embiggen-disk as a systemd unit that runs the
//! daemon against `/`.
//!
//! Generates the unit file, writes it to the system unit directory, and drives
//! `systemctl` through the platform seam for lifecycle.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::ServiceConfig;
use crate::core::errors::{EmbError, Result};
use crate::platform::pal::{Platform, ServiceManager};

/// Unit name for the systemd service.
pub const SYSTEMD_UNIT_NAME: &str = "embiggen-disk.service";

/// Parameters controlling unit file generation.
#[derive(Debug, Clone)]
pub struct SystemdConfig {
    /// Absolute path to the binary baked into `ExecStart`.
    pub binary_path: PathBuf,
    /// Where the unit file is written.
    pub unit_path: PathBuf,
}

impl SystemdConfig {
    /// Build from configuration, locating the binary when it is not pinned.
    pub fn from_config(service: &ServiceConfig) -> Result<Self> {
        let binary_path = match &service.binary_path {
            Some(path) => path.clone(),
            None => resolve_embiggen_binary()?,
        };
        Ok(Self {
            binary_path,
            unit_path: service.unit_path.clone(),
        })
    }
}

/// [`ServiceManager`] that writes the unit file and enables it with `systemctl`.
pub struct SystemdServiceManager {
    config: SystemdConfig,
    platform: Arc<dyn Platform>,
}

impl SystemdServiceManager {
    #[must_use]
    pub fn new(config: SystemdConfig, platform: Arc<dyn Platform>) -> Self {
        Self { config, platform }
    }

    /// Generate the full systemd unit file content. The last line carries no
    /// newline, matching unit files already installed in the field.
    #[must_use]
    pub fn generate_unit_file(&self) -> String {
        let binary = self.config.binary_path.display();
        let mut unit = String::with_capacity(160);

        writeln!(unit, "[Unit]").ok();
        writeln!(unit, "Description=embiggen-disk").ok();
        writeln!(unit).ok();

        writeln!(unit, "[Service]").ok();
        writeln!(unit, "ExecStart={binary} -verbose -daemon /").ok();
        writeln!(unit).ok();

        writeln!(unit, "[Install]").ok();
        write!(unit, "WantedBy=multi-user.target").ok();

        unit
    }

    fn run_systemctl(&self, args: &[&str]) -> Result<String> {
        let stdout = self
            .platform
            .run("systemctl", args)?
            .into_stdout("systemctl")?;
        Ok(stdout.trim().to_string())
    }
}

impl ServiceManager for SystemdServiceManager {
    fn install(&self) -> Result<()> {
        let unit_path = &self.config.unit_path;
        if let Some(unit_dir) = unit_path.parent() {
            fs::create_dir_all(unit_dir).map_err(|source| EmbError::io(unit_dir, source))?;
        }
        fs::write(unit_path, self.generate_unit_file())
            .map_err(|source| EmbError::io(unit_path, source))?;

        self.run_systemctl(&["daemon-reload"])?;
        self.run_systemctl(&["enable", SYSTEMD_UNIT_NAME])?;
        self.run_systemctl(&["start", SYSTEMD_UNIT_NAME])?;
        Ok(())
    }

    fn status(&self) -> Result<String> {
        self.run_systemctl(&["status", SYSTEMD_UNIT_NAME])
    }
}

/// Resolve the embiggen-disk binary (prefers the running binary, then the
/// usual install locations).
fn resolve_embiggen_binary() -> Result<PathBuf> {
    if let Ok(exe) = env::current_exe()
        && exe.exists()
    {
        return Ok(exe);
    }
    for candidate in &["/usr/local/bin/embiggen-disk", "/usr/bin/embiggen-disk"] {
        let p = Path::new(candidate);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    Err(EmbError::Runtime {
        details: "could not locate embiggen-disk binary; install it to a PATH directory first"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{CommandOutput, MockPlatform};

    fn manager(unit_path: PathBuf, mock: Arc<MockPlatform>) -> SystemdServiceManager {
        SystemdServiceManager::new(
            SystemdConfig {
                binary_path: PathBuf::from("/usr/local/bin/embiggen-disk"),
                unit_path,
            },
            mock,
        )
    }

    fn healthy_systemctl() -> MockPlatform {
        MockPlatform::default()
            .with_command("systemctl daemon-reload", CommandOutput::ok(""))
            .with_command("systemctl enable embiggen-disk.service", CommandOutput::ok(""))
            .with_command("systemctl start embiggen-disk.service", CommandOutput::ok(""))
            .with_command(
                "systemctl status embiggen-disk.service",
                CommandOutput::ok("  Active: active (running)\n"),
            )
    }

    #[test]
    fn unit_file_matches_expected_layout() {
        let mgr = manager(
            PathBuf::from("/etc/systemd/system/embiggen-disk.service"),
            Arc::new(MockPlatform::default()),
        );
        assert_eq!(
            mgr.generate_unit_file(),
            "[Unit]\n\
             Description=embiggen-disk\n\
             \n\
             [Service]\n\
             ExecStart=/usr/local/bin/embiggen-disk -verbose -daemon /\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target"
        );
    }

    #[test]
    fn install_writes_unit_and_enables_service() {
        let dir = tempfile::tempdir().expect("tempdir");
        let unit_path = dir.path().join("system").join(SYSTEMD_UNIT_NAME);
        let mock = Arc::new(healthy_systemctl());
        let mgr = manager(unit_path.clone(), Arc::clone(&mock));

        mgr.install().expect("install");

        let written = fs::read_to_string(&unit_path).expect("unit written");
        assert!(written.contains("ExecStart=/usr/local/bin/embiggen-disk -verbose -daemon /"));
        assert_eq!(
            mock.calls(),
            vec![
                "systemctl daemon-reload",
                "systemctl enable embiggen-disk.service",
                "systemctl start embiggen-disk.service",
            ]
        );
        assert_eq!(mgr.status().expect("status"), "Active: active (running)");
    }

    #[test]
    fn install_stops_at_first_systemctl_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mock = Arc::new(MockPlatform::default().with_command(
            "systemctl daemon-reload",
            CommandOutput::failed(1, "Access denied"),
        ));
        let mgr = manager(dir.path().join(SYSTEMD_UNIT_NAME), Arc::clone(&mock));

        let err = mgr.install().expect_err("daemon-reload fails");

        assert_eq!(err.code(), "EMB-2301");
        assert!(err.to_string().contains("Access denied"));
        assert_eq!(mock.calls(), vec!["systemctl daemon-reload"]);
    }

    #[test]
    fn pinned_binary_path_is_used() {
        let service = ServiceConfig {
            unit_path: PathBuf::from("/etc/systemd/system/embiggen-disk.service"),
            binary_path: Some(PathBuf::from("/opt/bin/embiggen-disk")),
        };
        let cfg = SystemdConfig::from_config(&service).expect("config");
        assert_eq!(cfg.binary_path, PathBuf::from("/opt/bin/embiggen-disk"));
    }
}

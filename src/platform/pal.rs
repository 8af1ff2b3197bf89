//! PAL trait and platform implementations (Linux, in-memory mock).
//!
//! Every probe a concrete resizer needs (mount table, `statvfs`, sysfs
//! attributes, symlink resolution, external tools) goes through [`Platform`]
//! so the resolver and resizers can be exercised against [`MockPlatform`].

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{EmbError, Result};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Filesystem size as reported by `statvfs`, in fragment-size blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_blocks: u64,
    pub fs_type: String,
    pub mount_point: PathBuf,
}

/// Mount-point metadata from the kernel mount table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
}

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout on success, [`EmbError::ToolFailed`] otherwise.
    pub fn into_stdout(self, program: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(EmbError::ToolFailed {
                program: program.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Service control surface (systemd).
pub trait ServiceManager {
    fn install(&self) -> Result<()>;
    fn status(&self) -> Result<String>;
}

/// OS abstraction used by the chain resolver, resizers, and service glue.
pub trait Platform: Send + Sync {
    fn mount_points(&self) -> Result<Vec<MountPoint>>;
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
    /// Read a small text attribute (sysfs) with surrounding whitespace trimmed.
    fn read_attr(&self, path: &Path) -> Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
    /// Run an external tool to completion; a non-zero exit is not an error here.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Linux platform implementation using `/proc`, `/sys` and `statvfs`.
///
/// The mount table is re-read on every call; a tick never sees the table a
/// previous tick read.
#[derive(Debug)]
pub struct LinuxPlatform {
    mounts_path: PathBuf,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::with_mounts_path(PROC_MOUNTS)
    }

    /// Read the mount table from `path` instead of `/proc/self/mounts`.
    #[must_use]
    pub fn with_mounts_path(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: path.into(),
        }
    }
}

impl Platform for LinuxPlatform {
    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        let raw = fs::read_to_string(&self.mounts_path)
            .map_err(|source| EmbError::io(&self.mounts_path, source))?;
        Ok(parse_proc_mounts(&raw))
    }

    #[cfg(unix)]
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let mounts = self.mount_points()?;
        let mount = find_mount(path, &mounts).ok_or_else(|| EmbError::MountNotFound {
            path: path.to_path_buf(),
        })?;
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| EmbError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(error),
        })?;
        Ok(FsStats {
            total_blocks: stat.blocks(),
            fs_type: mount.fs_type.clone(),
            mount_point: mount.path.clone(),
        })
    }

    #[cfg(not(unix))]
    fn fs_stats(&self, _path: &Path) -> Result<FsStats> {
        Err(EmbError::UnsupportedPlatform {
            details: "statvfs is only available on Unix".to_string(),
        })
    }

    fn read_attr(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map(|raw| raw.trim().to_string())
            .map_err(|source| EmbError::io(path, source))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).map_err(|source| EmbError::io(path, source))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| EmbError::io(program, source))?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Canned response for a [`MockPlatform`] command, optionally rewriting
/// attributes to simulate the command's effect on the system.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub output: CommandOutput,
    pub attr_writes: Vec<(PathBuf, String)>,
    pub stats_writes: Vec<(PathBuf, u64)>,
}

impl From<CommandOutput> for MockResponse {
    fn from(output: CommandOutput) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }
}

/// In-memory mock implementation for deterministic tests.
#[derive(Debug, Default)]
pub struct MockPlatform {
    mounts: Vec<MountPoint>,
    stats_by_mount: Mutex<HashMap<PathBuf, FsStats>>,
    attrs: Mutex<HashMap<PathBuf, String>>,
    links: HashMap<PathBuf, PathBuf>,
    responses: Mutex<HashMap<String, MockResponse>>,
    calls: Mutex<Vec<String>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(mounts: Vec<MountPoint>) -> Self {
        Self {
            mounts,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stats(self, stats: FsStats) -> Self {
        self.stats_by_mount
            .lock()
            .insert(stats.mount_point.clone(), stats);
        self
    }

    #[must_use]
    pub fn with_attr(self, path: impl Into<PathBuf>, value: impl Into<String>) -> Self {
        self.attrs.lock().insert(path.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_link(mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        self.links.insert(from.into(), to.into());
        self
    }

    /// Register the response for an exact command line, e.g. `"growpart /dev/sda 1"`.
    #[must_use]
    pub fn with_command(self, command_line: &str, response: impl Into<MockResponse>) -> Self {
        self.responses
            .lock()
            .insert(command_line.to_string(), response.into());
        self
    }

    /// Command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Platform for MockPlatform {
    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        Ok(self.mounts.clone())
    }

    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let mount = find_mount(path, &self.mounts).ok_or_else(|| EmbError::MountNotFound {
            path: path.to_path_buf(),
        })?;
        self.stats_by_mount
            .lock()
            .get(&mount.path)
            .cloned()
            .ok_or_else(|| EmbError::Runtime {
                details: format!("mock stats not found for {}", mount.path.display()),
            })
    }

    fn read_attr(&self, path: &Path) -> Result<String> {
        self.attrs.lock().get(path).cloned().ok_or_else(|| {
            EmbError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "mock attribute missing"),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.attrs.lock().contains_key(path) || self.links.contains_key(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(self
            .links
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_path_buf()))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().push(line.clone());

        let Some(response) = self.responses.lock().get(&line).cloned() else {
            return Ok(CommandOutput::failed(127, format!("mock: no response for {line}")));
        };
        {
            let mut attrs = self.attrs.lock();
            for (path, value) in &response.attr_writes {
                attrs.insert(path.clone(), value.clone());
            }
        }
        {
            let mut stats = self.stats_by_mount.lock();
            for (mount, blocks) in &response.stats_writes {
                if let Some(entry) = stats.get_mut(mount) {
                    entry.total_blocks = *blocks;
                }
            }
        }
        Ok(response.output)
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(EmbError::UnsupportedPlatform {
            details: "embiggen-disk only runs on Linux".to_string(),
        })
    }
}

fn parse_proc_mounts(raw: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            eprintln!("[EMB-MOUNTS] warning: skipping malformed /proc/self/mounts line: {line}");
            continue;
        }
        mounts.push(MountPoint {
            path: unescape_mount_path(fields[1]),
            device: fields[0].to_string(),
            fs_type: fields[2].to_string(),
        });
    }
    mounts
}

/// Longest mount-path prefix of `path`.
pub fn find_mount<'a>(path: &Path, mounts: &'a [MountPoint]) -> Option<&'a MountPoint> {
    mounts
        .iter()
        .filter(|mount| path.starts_with(&mount.path))
        .max_by_key(|mount| mount.path.as_os_str().len())
}

/// Mount whose path is exactly `path`. When the same path is mounted more
/// than once the last (topmost) entry wins, as the kernel resolves it.
pub fn find_exact_mount<'a>(path: &Path, mounts: &'a [MountPoint]) -> Option<&'a MountPoint> {
    mounts.iter().rev().find(|mount| mount.path == path)
}

/// Decode octal escape sequences (`\NNN`) used by the Linux kernel.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let a = raw_bytes[i + 1];
            let b = raw_bytes[i + 2];
            let c = raw_bytes[i + 3];
            if (b'0'..=b'7').contains(&a)
                && (b'0'..=b'7').contains(&b)
                && (b'0'..=b'7').contains(&c)
            {
                let val = (a - b'0') * 64 + (b - b'0') * 8 + (c - b'0');
                bytes.push(val);
                i += 4;
                continue;
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{EmbError, Result};

/// Default location of the optional config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/embiggen-disk/config.toml";

/// Full embiggen-disk configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonSettings,
    pub restart: RestartConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Tick scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonSettings {
    /// Seconds between ticks in daemon mode.
    pub interval_secs: u64,
}

/// Dependent service restarted after a tick that changed something.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestartConfig {
    pub enabled: bool,
    pub unit: String,
}

/// Systemd unit installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    pub unit_path: PathBuf,
    /// Binary written into `ExecStart`; the running executable when unset.
    pub binary_path: Option<PathBuf>,
}

/// Activity-log switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append change records and failures to `paths.activity_log`.
    pub activity_log: bool,
    pub max_log_bytes: u64,
    pub max_rotated_files: u32,
}

/// Filesystem paths used by embiggen-disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unit: "kubelet".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unit_path: PathBuf::from("/etc/systemd/system/embiggen-disk.service"),
            binary_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log: true,
            max_log_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_PATH),
            activity_log: PathBuf::from("/var/lib/embiggen-disk/activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| EmbError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(EmbError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config for the activity log.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("EMB_DAEMON_INTERVAL_SECS") {
            self.daemon.interval_secs = parse_env_u64("EMB_DAEMON_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("EMB_RESTART_ENABLED") {
            self.restart.enabled = parse_env_bool("EMB_RESTART_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("EMB_RESTART_UNIT") {
            self.restart.unit = raw;
        }
        if let Some(raw) = lookup("EMB_SERVICE_BINARY_PATH") {
            self.service.binary_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("EMB_LOGGING_ACTIVITY_LOG") {
            self.logging.activity_log = parse_env_bool("EMB_LOGGING_ACTIVITY_LOG", &raw)?;
        }
        if let Some(raw) = lookup("EMB_PATHS_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.daemon.interval_secs == 0 {
            return Err(EmbError::InvalidConfig {
                details: "daemon.interval_secs must be >= 1".to_string(),
            });
        }

        if self.restart.enabled {
            let unit = self.restart.unit.trim();
            if unit.is_empty() || unit.contains(char::is_whitespace) {
                return Err(EmbError::InvalidConfig {
                    details: format!(
                        "restart.unit must be a single systemd unit name, got {:?}",
                        self.restart.unit
                    ),
                });
            }
        }

        if !self.service.unit_path.is_absolute() {
            return Err(EmbError::InvalidConfig {
                details: format!(
                    "service.unit_path must be absolute, got {}",
                    self.service.unit_path.display()
                ),
            });
        }
        if let Some(binary) = &self.service.binary_path
            && !binary.is_absolute()
        {
            return Err(EmbError::InvalidConfig {
                details: format!(
                    "service.binary_path must be absolute, got {}",
                    binary.display()
                ),
            });
        }

        if self.logging.activity_log && self.logging.max_log_bytes == 0 {
            return Err(EmbError::InvalidConfig {
                details: "logging.max_log_bytes must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| EmbError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| EmbError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

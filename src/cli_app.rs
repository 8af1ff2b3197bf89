//! Top-level CLI definition and dispatch.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use embiggen_disk::core::config::Config;
use embiggen_disk::core::errors::EmbError;
use embiggen_disk::daemon::loop_main::{DaemonConfig, ResizeDaemon, RunMode};
use embiggen_disk::daemon::restart::restart_hook_from_config;
use embiggen_disk::daemon::service::{SYSTEMD_UNIT_NAME, SystemdConfig, SystemdServiceManager};
use embiggen_disk::daemon::signals::ShutdownSignal;
use embiggen_disk::logger::jsonl::{JsonlConfig, JsonlWriter};
use embiggen_disk::platform::pal::{Platform, ServiceManager, detect_platform};
use embiggen_disk::resize::resizer::ResizeMode;
use embiggen_disk::resolver::system::SystemChainResolver;

/// Argument that installs the service instead of naming a mount point.
const SYSTEMD_KEYWORD: &str = "systemd";

/// Long flags also accepted with a single dash, as older unit files spell them.
const SINGLE_DASH_LONG_FLAGS: &[&str] = &["dry-run", "verbose", "daemon", "config", "help", "version"];

/// Live-grow a mounted filesystem and the LVM volumes and partition beneath it.
#[derive(Debug, Parser)]
#[command(
    name = "embiggen-disk",
    author,
    version,
    about = "Live-resize a filesystem, its LVM volumes and its partition to fill the disk",
    long_about = None,
    arg_required_else_help = true,
    after_help = "Pass `systemd` instead of a mount point to install, enable and start \
                  embiggen-disk.service in daemon mode for /."
)]
pub struct Cli {
    /// Mount point to enlarge, or `systemd` to install the service unit.
    #[arg(value_name = "MOUNT_POINT|systemd")]
    target: PathBuf,
    /// Don't make changes; print the commands that would run.
    #[arg(long)]
    dry_run: bool,
    /// Verbose diagnostics on stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Keep running, re-checking every `daemon.interval_secs`.
    #[arg(long)]
    daemon: bool,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad invocation or configuration.
    #[error("{0}")]
    User(String),
    /// A resize, tool or service operation failed.
    #[error("{0}")]
    Runtime(String),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
        }
    }
}

impl From<EmbError> for CliError {
    fn from(err: EmbError) -> Self {
        match err {
            EmbError::InvalidConfig { .. }
            | EmbError::MissingConfig { .. }
            | EmbError::ConfigParse { .. }
            | EmbError::UnsupportedPlatform { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Rewrite Go-style `-verbose` / `-config=x` into `--verbose` / `--config=x`.
///
/// Only known long flags are rewritten so `-v` keeps its short meaning.
/// Arguments after `--` are left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    for (index, arg) in args.into_iter().enumerate() {
        let arg: OsString = arg.into();
        if index == 0 || passthrough {
            out.push(arg);
            continue;
        }
        let rewritten = arg.to_str().and_then(|s| {
            if s == "--" {
                return None;
            }
            let body = s.strip_prefix('-').filter(|body| !body.starts_with('-'))?;
            let name = body.split('=').next().unwrap_or(body);
            SINGLE_DASH_LONG_FLAGS
                .contains(&name)
                .then(|| OsString::from(format!("-{s}")))
        });
        if arg == "--" {
            passthrough = true;
        }
        out.push(rewritten.unwrap_or(arg));
    }
    out
}

/// Dispatch: install the unit, or grow the named mount point.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if !cfg!(target_os = "linux") {
        return Err(EmbError::UnsupportedPlatform {
            details: "embiggen-disk only runs on Linux".to_string(),
        }
        .into());
    }

    let config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        eprintln!(
            "[EMB-VERBOSE] config {} (hash {})",
            config.paths.config_file.display(),
            config.stable_hash().unwrap_or_default()
        );
    }
    let platform = detect_platform()?;

    if cli.target.as_os_str() == SYSTEMD_KEYWORD {
        return install_service(&config, platform);
    }

    run_resize(cli, &config, platform)
}

fn install_service(config: &Config, platform: Arc<dyn Platform>) -> Result<(), CliError> {
    let manager = SystemdServiceManager::new(SystemdConfig::from_config(&config.service)?, platform);
    manager.install()?;
    println!("{}", manager.status()?);
    println!("Successfully setup {SYSTEMD_UNIT_NAME}");
    Ok(())
}

fn run_resize(cli: &Cli, config: &Config, platform: Arc<dyn Platform>) -> Result<(), CliError> {
    let mode = if cli.daemon {
        RunMode::Daemon
    } else {
        RunMode::Once
    };
    let daemon_config = DaemonConfig::from_config(
        config,
        cli.target.clone(),
        mode,
        ResizeMode::from_dry_run(cli.dry_run),
        cli.verbose,
    );
    let resolver = SystemChainResolver::new(Arc::clone(&platform));
    let restart = restart_hook_from_config(platform, &config.restart);

    let mut daemon = ResizeDaemon::new(daemon_config, resolver, restart);
    if let Some(jsonl) = JsonlConfig::from_config(config) {
        daemon = daemon.with_activity_log(JsonlWriter::open(jsonl), config.stable_hash().ok());
    }

    let shutdown = match mode {
        RunMode::Daemon => ShutdownSignal::install(),
        RunMode::Once => ShutdownSignal::detached(),
    };
    daemon.run(&shutdown)?;
    Ok(())
}

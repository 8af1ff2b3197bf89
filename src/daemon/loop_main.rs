//! Main loop: resolve the chain for one mount point, grow it, report, repeat.
//!
//! Every tick rebuilds the chain from scratch, since the storage stack
//! underneath a mount can change between ticks. Ticks are strictly
//! sequential. Shutdown is only observed while waiting between ticks; a resize
//! in flight always runs to completion. Any chain error is fatal: it is
//! reported and returned, and the service manager decides whether to restart.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::Config;
use crate::core::errors::{EmbError, Result};
use crate::daemon::restart::RestartHook;
use crate::daemon::signals::ShutdownSignal;
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::resize::chain::resize_chain;
use crate::resize::resizer::{ChangeRecord, ResizeMode};
use crate::resolver::ChainResolver;

/// Single pass or repeating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Tick once, immediately.
    Once,
    /// Wait an interval before every tick until shutdown.
    Daemon,
}

/// Everything the loop needs to know, resolved from CLI flags and config.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub mount_point: PathBuf,
    pub mode: RunMode,
    pub interval: Duration,
    pub resize_mode: ResizeMode,
    pub verbose: bool,
}

impl DaemonConfig {
    pub fn from_config(
        config: &Config,
        mount_point: impl Into<PathBuf>,
        mode: RunMode,
        resize_mode: ResizeMode,
        verbose: bool,
    ) -> Self {
        Self {
            mount_point: mount_point.into(),
            mode,
            interval: Duration::from_secs(config.daemon.interval_secs),
            resize_mode,
            verbose,
        }
    }
}

/// What a successful tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub changes: Vec<ChangeRecord>,
    /// Whether the restart hook ran and succeeded.
    pub restarted: bool,
}

/// Drives the resize loop for one mount point.
///
/// Human-readable progress goes to `out` (stdout in production); diagnostics
/// go to stderr; structured records go to the optional activity log.
pub struct ResizeDaemon<R, H, W = io::Stdout> {
    config: DaemonConfig,
    resolver: R,
    restart: H,
    activity: Option<JsonlWriter>,
    config_hash: Option<String>,
    out: W,
}

impl<R: ChainResolver, H: RestartHook> ResizeDaemon<R, H> {
    pub fn new(config: DaemonConfig, resolver: R, restart: H) -> Self {
        Self {
            config,
            resolver,
            restart,
            activity: None,
            config_hash: None,
            out: io::stdout(),
        }
    }
}

impl<R: ChainResolver, H: RestartHook, W: Write> ResizeDaemon<R, H, W> {
    /// Redirect progress output.
    pub fn with_output<W2: Write>(self, out: W2) -> ResizeDaemon<R, H, W2> {
        ResizeDaemon {
            config: self.config,
            resolver: self.resolver,
            restart: self.restart,
            activity: self.activity,
            config_hash: self.config_hash,
            out,
        }
    }

    #[must_use]
    pub fn with_activity_log(mut self, writer: JsonlWriter, config_hash: Option<String>) -> Self {
        self.activity = Some(writer);
        self.config_hash = config_hash;
        self
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run until done: one tick in [`RunMode::Once`], otherwise until
    /// `shutdown` trips or a tick fails.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<()> {
        let mut start = LogEntry::new(EventType::DaemonStart, Severity::Info)
            .with_details(format!(
                "version={} mode={:?}",
                env!("CARGO_PKG_VERSION"),
                self.config.mode
            ));
        start.mount_point = Some(self.config.mount_point.display().to_string());
        start.config_hash = self.config_hash.clone();
        start.dry_run = self.config.resize_mode.is_dry_run().then_some(true);
        self.record(&start);

        let result = match self.config.mode {
            RunMode::Once => self.tick().map(|_| ()),
            RunMode::Daemon => self.run_daemon(shutdown),
        };

        let stop = LogEntry::new(EventType::DaemonStop, Severity::Info).with_details(
            match &result {
                Ok(()) => "clean".to_string(),
                Err(e) => format!("fatal {}", e.code()),
            },
        );
        self.record(&stop);
        result
    }

    fn run_daemon(&mut self, shutdown: &ShutdownSignal) -> Result<()> {
        loop {
            if !shutdown.wait(self.config.interval) {
                eprintln!("[EMB-SIGNAL] shutdown requested, exiting");
                return Ok(());
            }
            if let Some(writer) = self.activity.as_mut() {
                writer.try_recover();
            }
            self.tick()?;
        }
    }

    /// One resolve-and-grow pass.
    ///
    /// Changes are printed (and the restart hook runs) even when the walk
    /// stopped early; the error is returned afterwards.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mount_point = self.config.mount_point.clone();

        let top = match self.resolver.resolve(&mount_point) {
            Ok(top) => top,
            Err(source) => {
                let err = EmbError::ChainResolution {
                    mount_point: mount_point.clone(),
                    source: Box::new(source),
                };
                self.record(&LogEntry::failure(EventType::TickError, &mount_point, &err));
                return Err(err);
            }
        };
        self.verbose(format_args!(
            "resolved {} -> {}",
            mount_point.display(),
            top.describe()
        ));

        let outcome = resize_chain(top.as_ref(), self.config.resize_mode);

        let mut restarted = false;
        if outcome.changes.is_empty() {
            if outcome.error.is_none() {
                self.say(format_args!("No changes made."));
            }
        } else {
            self.report_changes(&mount_point, &outcome.changes);
            restarted = self.run_restart_hook(&mount_point);
        }

        if let Some(err) = outcome.error {
            let mut entry = LogEntry::failure(EventType::TickError, &mount_point, &err);
            if err.is_chain_stage() && !outcome.changes.is_empty() {
                entry = entry.with_details(format!(
                    "{} deeper change(s) kept",
                    outcome.changes.len()
                ));
            }
            self.record(&entry);
            return Err(err);
        }

        Ok(TickReport {
            changes: outcome.changes,
            restarted,
        })
    }

    fn report_changes(&mut self, mount_point: &Path, changes: &[ChangeRecord]) {
        let dry_run = self.config.resize_mode.is_dry_run();
        self.say(format_args!("Changes made:"));
        for change in changes {
            self.say(format_args!("  * {change}"));
            self.record(&LogEntry::change(mount_point, change, dry_run));
        }
    }

    fn run_restart_hook(&mut self, mount_point: &Path) -> bool {
        if self.restart.is_noop() {
            return false;
        }
        let target = self.restart.target();

        if self.config.resize_mode.is_dry_run() {
            eprintln!("[EMB-DRY-RUN] skipping restart of {target}");
            let mut entry = LogEntry::new(EventType::RestartSkipped, Severity::Info)
                .with_details(format!("dry-run; would restart {target}"));
            entry.mount_point = Some(mount_point.display().to_string());
            self.record(&entry);
            return false;
        }

        match self.restart.restart() {
            Ok(output) => {
                let output = output.trim();
                if output.is_empty() {
                    self.say(format_args!("Restarted {target}!"));
                } else {
                    self.say(format_args!("Restarted {target}! {output}"));
                }
                let mut entry = LogEntry::new(EventType::RestartDone, Severity::Info)
                    .with_details(target);
                entry.mount_point = Some(mount_point.display().to_string());
                self.record(&entry);
                true
            }
            Err(e) => {
                eprintln!("[EMB-RESTART] restart of {target} failed: {e}");
                self.record(
                    &LogEntry::failure(EventType::RestartFailed, mount_point, &e)
                        .with_details(target),
                );
                false
            }
        }
    }

    fn say(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{line}") {
            eprintln!("[EMB-DAEMON] failed to write progress: {e}");
        }
    }

    fn verbose(&self, line: std::fmt::Arguments<'_>) {
        if self.config.verbose {
            eprintln!("[EMB-VERBOSE] {line}");
        }
    }

    fn record(&mut self, entry: &LogEntry) {
        if let Some(writer) = self.activity.as_mut() {
            writer.write_entry(entry);
        }
    }
}

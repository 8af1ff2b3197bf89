//! Chain resolution: map a mount point to the topmost [`Resizer`] of its
//! storage stack, plus the concrete Linux layers (filesystem, LVM, partition).

use std::path::Path;

use crate::core::errors::{EmbError, Result};
use crate::platform::pal::{CommandOutput, Platform};
use crate::resize::resizer::{ResizeMode, Resizer};

pub mod blockdev;
pub mod filesystem;
pub mod lvm;
pub mod partition;
pub mod system;

/// Produces a fresh chain for a mount point; called once per daemon tick.
pub trait ChainResolver {
    fn resolve(&self, mount_point: &Path) -> Result<Box<dyn Resizer>>;
}

impl<F> ChainResolver for F
where
    F: Fn(&Path) -> Result<Box<dyn Resizer>>,
{
    fn resolve(&self, mount_point: &Path) -> Result<Box<dyn Resizer>> {
        self(mount_point)
    }
}

/// Run a mutating tool, or only announce it in dry-run mode.
///
/// Returns `None` when nothing was executed.
pub(crate) fn run_mutation(
    platform: &dyn Platform,
    mode: ResizeMode,
    program: &str,
    args: &[&str],
) -> Result<Option<CommandOutput>> {
    if mode.is_dry_run() {
        eprintln!("[EMB-DRY-RUN] would run: {program} {}", args.join(" "));
        return Ok(None);
    }
    platform.run(program, args).map(Some)
}

/// Parse a single unsigned integer printed by an LVM report command.
pub(crate) fn parse_single_u64(program: &str, stdout: &str) -> Result<u64> {
    let trimmed = stdout.trim();
    trimmed.parse::<u64>().map_err(|error| EmbError::ToolOutput {
        program: program.to_string(),
        details: format!("expected an integer, got {trimmed:?}: {error}"),
    })
}

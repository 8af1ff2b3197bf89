//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use embiggen_disk::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{EmbError, Result};

// Platform
pub use crate::platform::pal::{FsStats, MountPoint, Platform, detect_platform};

// Resize chain
pub use crate::resize::chain::{ChainOutcome, resize_chain};
pub use crate::resize::resizer::{ChangeRecord, ResizeMode, Resizer, ResizerState};

// Resolution
pub use crate::resolver::ChainResolver;
pub use crate::resolver::system::SystemChainResolver;

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{DaemonConfig, ResizeDaemon, RunMode, TickReport};
pub use crate::daemon::restart::{NoopRestart, RestartHook, SystemctlRestart};
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::ShutdownSignal;

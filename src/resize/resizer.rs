//! The resizer contract: one resizable storage layer and its dependency link.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Opaque, comparable snapshot of a layer's current size/extent.
///
/// Compared by exact value; `"1024 blocks"` and `"1024  blocks"` differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResizerState(String);

impl ResizerState {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResizerState {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResizerState {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether a resize operation may mutate the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Run the growth commands.
    #[default]
    Apply,
    /// Report what would run; never mutate.
    DryRun,
}

impl ResizeMode {
    #[must_use]
    pub const fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Apply }
    }

    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Anything that can enlarge one storage layer and describe its state.
///
/// A resizer may depend on another resizer (the layer one step closer to the
/// physical device) which must be grown first. Chains are singly linked and
/// acyclic; they are built fresh for every resize attempt and never cached.
pub trait Resizer {
    /// Stable identity for logs and change reports, e.g. `"ext4 filesystem at /"`.
    fn describe(&self) -> String;

    /// Current size snapshot, read from the live system on every call.
    fn state(&self) -> Result<ResizerState>;

    /// Grow this layer to whatever its dependency now permits.
    ///
    /// Must be idempotent: when no growth is possible this is a no-op that
    /// returns `Ok(())`. In [`ResizeMode::DryRun`] nothing is mutated.
    fn resize(&self, mode: ResizeMode) -> Result<()>;

    /// The next layer down the chain, or `None` when this layer sits directly
    /// on the lowest level.
    fn dependency(&self) -> Result<Option<Box<dyn Resizer>>>;
}

impl fmt::Debug for dyn Resizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resizer").field(&self.describe()).finish()
    }
}

/// One chain level whose observable state differed across its resize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub resizer: String,
    pub before: ResizerState,
    pub after: ResizerState,
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: before: {}, after: {}",
            self.resizer, self.before, self.after
        )
    }
}

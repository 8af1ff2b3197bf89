//! Bottom-up chain walk: grow every dependency before the layer resting on it.
//!
//! The walk is depth-first: read the layer's state, resolve its dependency,
//! recurse into the dependency, resize the layer, then re-read its state and
//! record a [`ChangeRecord`] when the two snapshots differ. Any failure stops
//! the walk immediately and is returned next to the records already confirmed
//! at deeper levels. Nothing is retried; re-running the walk is safe because
//! every resize is idempotent.

use crate::core::errors::{EmbError, Result};
use crate::resize::resizer::{ChangeRecord, ResizeMode, Resizer};

/// Result of one chain walk: records confirmed so far plus the error that
/// stopped the walk, if any. Records are ordered dependency-first.
#[derive(Debug, Default)]
pub struct ChainOutcome {
    pub changes: Vec<ChangeRecord>,
    pub error: Option<EmbError>,
}

impl ChainOutcome {
    /// Whether the walk reached the top of the chain.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Drop partial records on failure.
    pub fn into_result(self) -> Result<Vec<ChangeRecord>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.changes),
        }
    }
}

/// Resize `top`'s dependencies and then `top` itself.
pub fn resize_chain(top: &dyn Resizer, mode: ResizeMode) -> ChainOutcome {
    let mut changes = Vec::new();
    let error = resize_level(top, mode, &mut changes).err();
    ChainOutcome { changes, error }
}

fn resize_level(
    resizer: &dyn Resizer,
    mode: ResizeMode,
    changes: &mut Vec<ChangeRecord>,
) -> Result<()> {
    let before = resizer
        .state()
        .map_err(|source| stage_error(resizer, source, Stage::State))?;

    let dependency = resizer
        .dependency()
        .map_err(|source| stage_error(resizer, source, Stage::Dependency))?;

    if let Some(dep) = dependency {
        // Deeper levels already attribute their own errors.
        resize_level(dep.as_ref(), mode, changes)?;
    }

    resizer
        .resize(mode)
        .map_err(|source| stage_error(resizer, source, Stage::Resize))?;

    let after = resizer
        .state()
        .map_err(|source| stage_error(resizer, source, Stage::PostResize))?;

    if before != after {
        changes.push(ChangeRecord {
            resizer: resizer.describe(),
            before,
            after,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    State,
    Dependency,
    Resize,
    PostResize,
}

fn stage_error(resizer: &dyn Resizer, source: EmbError, stage: Stage) -> EmbError {
    let resizer = resizer.describe();
    let source = Box::new(source);
    match stage {
        Stage::State => EmbError::StateRead { resizer, source },
        Stage::Dependency => EmbError::DependencyResolution { resizer, source },
        Stage::Resize => EmbError::ResizeExecution { resizer, source },
        Stage::PostResize => EmbError::PostResizeState { resizer, source },
    }
}

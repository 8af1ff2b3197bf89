//! Mount-point argument normalization.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::platform::pal::Platform;

/// Resolve a user-supplied mount point to the absolute form the kernel mount
/// table uses.
///
/// Paths the platform can canonicalize have their symlinks resolved. Paths
/// that do not exist are made absolute against the CWD and `.`/`..` are
/// folded syntactically, so the lookup fails later with a clear "no mount"
/// error.
pub fn resolve_absolute_path(path: &Path, platform: &dyn Platform) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    match platform.canonicalize(&absolute) {
        Ok(canonical) => normalize_syntactic(&canonical),
        Err(_) => normalize_syntactic(&absolute),
    }
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, symlink-free path.
///
/// Existing paths go through `fs::canonicalize`. Paths that do not exist are
/// made absolute against the CWD with `..`/`.` resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

/// Join a relative subpath onto a branch root, treating an empty subpath as
/// the root itself.
#[must_use]
pub fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Strip a trailing `/` from a branch path, keeping `/` itself intact.
#[must_use]
pub fn trim_trailing_slash(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.len() > 1
        && let Some(stripped) = s.strip_suffix('/')
    {
        return PathBuf::from(stripped);
    }
    path.to_path_buf()
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

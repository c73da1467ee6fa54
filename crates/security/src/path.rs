//! Path resolution against the session's working directory.
//!
//! Permission decisions are keyed by absolute path, so every path a tool
//! receives is resolved the same way before it reaches the gate.

use std::path::{Component, Path, PathBuf};

/// Resolve `raw` against `working_dir`.
///
/// Relative paths are joined onto the working directory. Existing paths are
/// canonicalized to resolve symlinks; for paths that don't exist yet (e.g.
/// a file about to be written) the nearest existing parent is canonicalized
/// and `.`/`..` components are folded lexically.
pub fn resolve_path(working_dir: &Path, raw: &str) -> PathBuf {
    let joined = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        working_dir.join(raw)
    };

    if let Ok(canonical) = joined.canonicalize() {
        return canonical;
    }

    let normalized = normalize(&joined);
    match (normalized.parent(), normalized.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(canonical_parent) => canonical_parent.join(name),
            Err(_) => normalized,
        },
        _ => normalized,
    }
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

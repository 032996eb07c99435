//! Target path handling
//!
//! Pack descriptors carry platform-neutral paths that may use either
//! separator. This module handles:
//! - Converting `\` to the native separator for filesystem operations
//! - Resolving descriptor paths against the install root
//! - Computing overwrite-rename targets from glob-style patterns

use std::path::{Path, PathBuf};

/// Convert pack-neutral separators to forward slashes.
/// `Data\readme.txt` -> `Data/readme.txt`
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a descriptor path to a native PathBuf.
pub fn to_native_pathbuf(path: &str) -> PathBuf {
    PathBuf::from(normalize_separators(path))
}

/// Resolve a descriptor target against the install root. Absolute paths are
/// used as-is; relative paths are joined under the root.
pub fn resolve_target(install_dir: &Path, target: &str) -> PathBuf {
    let native = to_native_pathbuf(target);
    if native.is_absolute() {
        native
    } else {
        install_dir.join(native)
    }
}

/// Compute the rename destination for a pre-existing target from a
/// glob-style pattern. A single `*` in the pattern stands for the original
/// file name; a pattern without `*` is taken literally. The destination is
/// a sibling of the original.
///
/// `rename_target("/opt/app/conf.xml", "*.bak")` -> `/opt/app/conf.xml.bak`
pub fn rename_target(original: &Path, pattern: &str) -> Option<PathBuf> {
    let name = original.file_name()?.to_str()?;
    let new_name = if pattern.contains('*') {
        pattern.replacen('*', name, 1)
    } else {
        pattern.to_string()
    };
    if new_name.is_empty() || new_name == name {
        return None;
    }
    Some(original.with_file_name(new_name))
}

/// List the ancestors of `path` below `root` that do not exist yet,
/// shallowest first. Used so each `mkdir` can be logged and announced
/// individually.
pub fn missing_ancestors(root: &Path, path: &Path) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || dir.exists() {
            break;
        }
        missing.push(dir.to_path_buf());
        current = dir.parent();
    }
    missing.reverse();
    missing
}

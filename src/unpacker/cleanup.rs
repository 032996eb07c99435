//! Update-check cleanup
//!
//! On update installs, packs may carry include/exclude glob rules naming
//! the area of the install tree they own. After extraction, everything in
//! that area that is neither just-installed nor previously recorded in the
//! uninstall log is stale and gets removed: files unconditionally,
//! directories deepest-first and only while still empty.

use crate::error::{Result, UnpackError};
use crate::pack::UpdateCheck;
use crate::uninstall::UninstallLog;
use crate::variables::VariableSubstitutor;

use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

struct CompiledCheck {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl CompiledCheck {
    fn matches(&self, relative: &str) -> bool {
        self.includes.iter().any(|p| p.matches(relative))
            && !self.excludes.iter().any(|p| p.matches(relative))
    }
}

/// Delete stale files under `install_dir` matched by the update-check rules
/// but absent from the uninstall log. Deletion failures are logged and
/// skipped; only bad patterns are fatal.
pub fn run_update_checks(
    install_dir: &Path,
    checks: &[UpdateCheck],
    substitutor: &dyn VariableSubstitutor,
    log: &UninstallLog,
) -> Result<()> {
    if checks.is_empty() {
        return Ok(());
    }
    let compiled = compile(checks, substitutor)?;
    let installed = log.path_set();

    let mut stale_files = Vec::new();
    let mut stale_dirs: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(install_dir).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("cleanup scan error: {e}");
                continue;
            }
        };
        let path = entry.path();
        if installed.contains(path) {
            continue;
        }
        let relative = match path.strip_prefix(install_dir) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if !compiled.iter().any(|c| c.matches(&relative)) {
            continue;
        }
        if entry.file_type().is_dir() {
            stale_dirs.push(path.to_path_buf());
        } else {
            stale_files.push(path.to_path_buf());
        }
    }

    info!(
        "update cleanup: {} stale files, {} candidate directories",
        stale_files.len(),
        stale_dirs.len()
    );
    for file in &stale_files {
        debug!("removing stale file {}", file.display());
        if let Err(e) = std::fs::remove_file(file) {
            warn!("could not remove {}: {e}", file.display());
        }
    }

    // Deepest first, so an emptied subtree collapses bottom-up. A directory
    // still holding anything (e.g. a parent of files just installed) is
    // left alone.
    stale_dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in &stale_dirs {
        let empty = std::fs::read_dir(dir)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !empty {
            continue;
        }
        debug!("removing empty stale directory {}", dir.display());
        if let Err(e) = std::fs::remove_dir(dir) {
            warn!("could not remove {}: {e}", dir.display());
        }
    }
    Ok(())
}

fn compile(
    checks: &[UpdateCheck],
    substitutor: &dyn VariableSubstitutor,
) -> Result<Vec<CompiledCheck>> {
    checks
        .iter()
        .map(|check| {
            Ok(CompiledCheck {
                includes: compile_globs(&check.includes, substitutor)?,
                excludes: compile_globs(&check.excludes, substitutor)?,
            })
        })
        .collect()
}

fn compile_globs(
    patterns: &[String],
    substitutor: &dyn VariableSubstitutor,
) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            let substituted = substitutor.substitute(raw).replace('\\', "/");
            Pattern::new(&substituted)
                .map_err(|e| UnpackError::Config(format!("bad update-check glob {raw}: {e}")))
        })
        .collect()
}

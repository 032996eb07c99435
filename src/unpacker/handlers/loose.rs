//! Loose-file unpacker
//!
//! Loosely-bundled packs carry descriptors but no inline bytes; the real
//! payload sits as a plain file next to the installer, resolved against the
//! install-source directory and then the current working directory. A
//! missing loose file is non-fatal: the user is warned and, unless they
//! cancel, installation continues without that file.

use crate::error::{Result, UnpackError};
use crate::pack::PackFile;
use crate::paths;
use crate::unpacker::copy::copy_exact;
use crate::unpacker::gate::CancellationGate;
use crate::unpacker::handlers::{finish, stage};
use crate::unpacker::queue::FileQueue;
use crate::variables::{PromptAnswer, PromptHandler};

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LooseOutcome {
    Installed { queued: bool },
    /// Source file absent; the user chose to continue without it.
    Missing,
}

/// Resolve and copy one loose file.
pub fn unpack_loose(
    gate: &CancellationGate,
    file: &PackFile,
    source_dir: &Path,
    target: &Path,
    queue: Option<&mut FileQueue>,
    prompt: &dyn PromptHandler,
) -> Result<LooseOutcome> {
    let source = match resolve_source(file, source_dir) {
        Some(path) => path,
        None => {
            warn!("loose file missing: {}", file.target_path);
            let answer = prompt.warn(&format!(
                "The file {} could not be found in the installation source; it will be skipped.",
                file.target_path
            ));
            if answer == PromptAnswer::Cancel {
                return Err(UnpackError::Cancelled);
            }
            return Ok(LooseOutcome::Missing);
        }
    };

    let length = std::fs::metadata(&source)
        .map_err(|e| UnpackError::fs(&source, e))?
        .len();
    let mut src = File::open(&source).map_err(|e| UnpackError::fs(&source, e))?;

    let staged = stage(file, target, queue.is_some())?;
    let mut out = File::create(&staged.write_path)
        .map_err(|e| UnpackError::fs(&staged.write_path, e))?;
    copy_exact(&mut src, &mut out, length, gate, target)?;
    drop(out);
    let queued = finish(file, staged, target, queue)?;
    Ok(LooseOutcome::Installed { queued })
}

/// First the install-source directory, then the current working directory.
fn resolve_source(file: &PackFile, source_dir: &Path) -> Option<PathBuf> {
    let relative = paths::to_native_pathbuf(&file.target_path);
    let candidate = source_dir.join(&relative);
    if candidate.is_file() {
        return Some(candidate);
    }
    let cwd = std::env::current_dir().ok()?;
    let candidate = cwd.join(&relative);
    candidate.is_file().then_some(candidate)
}

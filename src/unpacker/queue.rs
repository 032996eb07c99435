//! Deferred-move file queue
//!
//! Blockable targets (files that may be open/locked at install time) are
//! written to a sibling temporary file and the final move is queued here.
//! The whole queue is committed exactly once, after every pack has been
//! extracted. A move whose target is busy is journaled into a pending-moves
//! file under the install root and flips the reboot flag; its temp source
//! is left in place for the post-reboot pass.

use crate::error::{Result, UnpackError};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the pending-moves journal under the install root.
pub const PENDING_MOVES_NAME: &str = ".pending-moves";

/// One deferred replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMove {
    pub temp_source: PathBuf,
    pub final_target: PathBuf,
    pub overwrite: bool,
    pub force_in_use: bool,
}

impl QueuedMove {
    pub fn forced(temp_source: PathBuf, final_target: PathBuf) -> Self {
        QueuedMove {
            temp_source,
            final_target,
            overwrite: true,
            force_in_use: true,
        }
    }
}

/// Ordered list of deferred moves, committed as a unit.
#[derive(Debug)]
pub struct FileQueue {
    moves: Vec<QueuedMove>,
    journal_path: PathBuf,
}

impl FileQueue {
    pub fn new(install_dir: &Path) -> Self {
        FileQueue {
            moves: Vec::new(),
            journal_path: install_dir.join(PENDING_MOVES_NAME),
        }
    }

    pub fn add(&mut self, queued: QueuedMove) {
        self.moves.push(queued);
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Perform every queued move. Returns whether a reboot is necessary,
    /// i.e. whether any move could not be completed now and was journaled.
    /// Called once, after all packs are processed.
    pub fn execute(&mut self) -> Result<bool> {
        let mut pending = Vec::new();
        for queued in self.moves.drain(..) {
            match perform_move(&queued) {
                Ok(()) => {
                    info!(
                        "moved {} -> {}",
                        queued.temp_source.display(),
                        queued.final_target.display()
                    );
                }
                Err(e) => {
                    warn!(
                        "target busy, deferring {} -> {}: {e}",
                        queued.temp_source.display(),
                        queued.final_target.display()
                    );
                    pending.push(queued);
                }
            }
        }

        if pending.is_empty() {
            return Ok(false);
        }
        self.write_journal(&pending)?;
        Ok(true)
    }

    fn write_journal(&self, pending: &[QueuedMove]) -> Result<()> {
        let mut journal = fs::File::create(&self.journal_path)
            .map_err(|e| UnpackError::fs(&self.journal_path, e))?;
        for queued in pending {
            writeln!(
                journal,
                "{}\t{}",
                queued.temp_source.display(),
                queued.final_target.display()
            )
            .map_err(|e| UnpackError::fs(&self.journal_path, e))?;
        }
        Ok(())
    }
}

/// Forced-overwrite move: delete the target if present, then rename the
/// temp source into place.
fn perform_move(queued: &QueuedMove) -> std::io::Result<()> {
    if queued.overwrite {
        match fs::remove_file(&queued.final_target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    fs::rename(&queued.temp_source, &queued.final_target)
}

/// Create a sibling temporary file for a blockable target and hand back its
/// path. The file must survive until the queue commits, so it is detached
/// from tempfile's auto-delete.
pub fn temp_sibling(target: &Path) -> Result<PathBuf> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".queued-")
        .tempfile_in(dir)
        .map_err(|e| UnpackError::fs(dir, e))?;
    let (_, path) = tmp.keep().map_err(|e| UnpackError::fs(target, e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_moves_everything_and_cleans_temps() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path();

        let target = install.join("app.dll");
        fs::write(&target, b"old").unwrap();
        let staged = temp_sibling(&target).unwrap();
        fs::write(&staged, b"new bytes").unwrap();

        let mut queue = FileQueue::new(install);
        queue.add(QueuedMove::forced(staged.clone(), target.clone()));
        assert_eq!(queue.len(), 1);

        let reboot = queue.execute().unwrap();
        assert!(!reboot);
        assert_eq!(fs::read(&target).unwrap(), b"new bytes");
        assert!(!staged.exists());
        assert!(!install.join(PENDING_MOVES_NAME).exists());
    }

    #[test]
    fn test_busy_target_is_journaled_and_flags_reboot() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path();

        // A non-empty directory at the target path makes both the delete
        // and the rename fail, standing in for an in-use file.
        let target = install.join("busy.bin");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupant"), b"x").unwrap();

        let staged = temp_sibling(&install.join("busy.bin.stage")).unwrap();
        fs::write(&staged, b"new").unwrap();

        let mut queue = FileQueue::new(install);
        queue.add(QueuedMove::forced(staged.clone(), target.clone()));
        let reboot = queue.execute().unwrap();
        assert!(reboot);
        // The temp source survives for the post-reboot pass.
        assert!(staged.exists());
        let journal = fs::read_to_string(install.join(PENDING_MOVES_NAME)).unwrap();
        assert!(journal.contains("busy.bin"));
    }

    #[test]
    fn test_temp_sibling_lives_next_to_target() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("lib/app.so");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        let staged = temp_sibling(&target).unwrap();
        assert_eq!(staged.parent(), target.parent());
        assert!(staged.exists());
        fs::remove_file(staged).unwrap();
    }
}

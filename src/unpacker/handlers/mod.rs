//! File unpacker variants
//!
//! One variant per payload acquisition scheme — plain inline bytes, loose
//! external files, repacked jars — sharing the staging/mtime/queue plumbing
//! defined here. `unpack(...) -> queued` semantics: when the descriptor is
//! blockable and the platform needs deferred replacement, bytes land in a
//! sibling temp file and a move is queued instead of touching the target.

pub mod direct;
pub mod loose;
pub mod repacked;

pub use direct::unpack_direct;
pub use loose::{unpack_loose, LooseOutcome};
pub use repacked::unpack_repacked_jar;

use crate::error::Result;
use crate::pack::{Blockable, PackFile};
use crate::unpacker::copy;
use crate::unpacker::queue::{temp_sibling, FileQueue, QueuedMove};

use std::path::{Path, PathBuf};

/// Where a variant should write, and whether the write is deferred.
pub(crate) struct StagedTarget {
    pub write_path: PathBuf,
    pub queued: bool,
}

/// Pick the write path: the final target, or a sibling temp file when the
/// descriptor is blockable and a queue is active.
pub(crate) fn stage(file: &PackFile, target: &Path, queue_active: bool) -> Result<StagedTarget> {
    let queued = queue_active && file.blockable != Blockable::None;
    let write_path = if queued {
        temp_sibling(target)?
    } else {
        target.to_path_buf()
    };
    Ok(StagedTarget { write_path, queued })
}

/// Shared completion: set the descriptor mtime on whatever was written and
/// enqueue the deferred move for queued targets. Returns `queued`.
pub(crate) fn finish(
    file: &PackFile,
    staged: StagedTarget,
    target: &Path,
    queue: Option<&mut FileQueue>,
) -> Result<bool> {
    if file.wants_mtime() {
        copy::set_mtime(&staged.write_path, file.last_modified)?;
    }
    if staged.queued {
        // stage() only queues when a queue is active.
        if let Some(queue) = queue {
            queue.add(QueuedMove::forced(staged.write_path, target.to_path_buf()));
        }
    }
    Ok(staged.queued)
}

//! Error taxonomy for the extraction engine
//!
//! Every fatal error unwinds to the top of `Unpacker::run`, where it is
//! classified as a cancellation (informational) or a real failure (error).
//! Non-fatal conditions (missing loose files, best-effort cleanup deletes)
//! are handled at the point of occurrence and never reach this type.

use std::io;
use std::path::{Path, PathBuf};

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, UnpackError>;

/// Fatal (and cancellation) conditions of an installation run.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// Stream framing is broken: short read, bad enum code, negative count,
    /// or a declared length the stream cannot satisfy.
    #[error("corrupt pack stream: {0}")]
    CorruptPack(String),

    /// A payload ended before its declared length during copy. Distinct from
    /// `CorruptPack`: this indicates a copy-time desync, typically a wrong
    /// back-reference offset.
    #[error("truncated pack payload: {0}")]
    TruncatedPack(String),

    /// A named pack or resource does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A remote fetch was cancelled through the cancellation gate. Treated
    /// as a clean cancellation, not an error.
    #[error("resource fetch interrupted: {0}")]
    ResourceInterrupted(String),

    /// Directory/file creation, rename, write or delete failure.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A post-install executable could not be spawned or exited non-zero.
    #[error("executable failed: {0}")]
    ExecutionFailed(String),

    /// Cooperative interruption observed at a checkpoint.
    #[error("installation cancelled")]
    Cancelled,

    /// Invalid configuration (unknown decoder name, bad glob pattern, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The extraction worker thread panicked.
    #[error("extraction worker panicked")]
    WorkerPanicked,
}

impl UnpackError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        UnpackError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this condition is a cooperative cancellation rather than a
    /// real failure. Cancellations are reported as informational messages.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            UnpackError::Cancelled | UnpackError::ResourceInterrupted(_)
        )
    }
}

impl From<binrw::Error> for UnpackError {
    fn from(err: binrw::Error) -> Self {
        UnpackError::CorruptPack(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_classification() {
        assert!(UnpackError::Cancelled.is_cancellation());
        assert!(UnpackError::ResourceInterrupted("pack-core".into()).is_cancellation());
        assert!(!UnpackError::CorruptPack("bad count".into()).is_cancellation());
        assert!(!UnpackError::fs("/tmp/x", io::Error::other("boom")).is_cancellation());
    }
}

//! Uninstall log
//!
//! Append-only ordered list of absolute paths created during extraction:
//! one entry per created directory or file, duplicates allowed. The
//! update-check cleanup pass treats it as the set of "just installed"
//! paths; removal ordering is the uninstaller's concern, not ours.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct UninstallLog {
    entries: Vec<PathBuf>,
}

impl UninstallLog {
    pub fn new() -> Self {
        UninstallLog::default()
    }

    pub fn record(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// De-duplicated view for membership tests.
    pub fn path_set(&self) -> HashSet<&Path> {
        self.entries.iter().map(PathBuf::as_path).collect()
    }
}

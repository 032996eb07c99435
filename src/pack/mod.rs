//! Pack data model
//!
//! Immutable value types produced by the pack compiler and consumed by the
//! extraction engine: one `PackFile` descriptor per file entry, plus the
//! trailing parsable/executable/update-check lists of each pack.

pub mod stream;

use serde::{Deserialize, Serialize};

/// Rule governing whether an existing target file is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverridePolicy {
    /// Always overwrite.
    Always,
    /// Never overwrite.
    Never,
    /// Overwrite only when the descriptor is newer than the target.
    Update,
    /// Ask the user; default answer is yes.
    AskYes,
    /// Ask the user; default answer is no.
    AskNo,
}

impl OverridePolicy {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(OverridePolicy::Always),
            1 => Some(OverridePolicy::Never),
            2 => Some(OverridePolicy::Update),
            3 => Some(OverridePolicy::AskYes),
            4 => Some(OverridePolicy::AskNo),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            OverridePolicy::Always => 0,
            OverridePolicy::Never => 1,
            OverridePolicy::Update => 2,
            OverridePolicy::AskYes => 3,
            OverridePolicy::AskNo => 4,
        }
    }
}

/// Whether the target may be open/locked at install time and therefore
/// needs the deferred-move queue on platforms that require it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blockable {
    None,
    Auto,
    Force,
}

impl Blockable {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Blockable::None),
            1 => Some(Blockable::Auto),
            2 => Some(Blockable::Force),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Blockable::None => 0,
            Blockable::Auto => 1,
            Blockable::Force => 2,
        }
    }
}

/// One file entry in a pack stream.
///
/// Exactly one of {inline payload bytes at the current stream position,
/// back-reference to an earlier pack} supplies the payload, except for
/// repacked jars whose inline data is a 4-byte shared-resource key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    /// Platform-neutral target path; variable-substituted and
    /// separator-normalized at install time.
    pub target_path: String,
    /// Exact payload byte count; bounds all reads.
    pub length: u64,
    /// Milliseconds since the epoch; negative means "leave untouched".
    pub last_modified: i64,
    pub is_directory: bool,
    pub override_policy: OverridePolicy,
    /// Glob-style rename pattern applied to a pre-existing target before
    /// overwrite (`*.bak`, `old-*`, ...).
    pub override_rename_to: Option<String>,
    pub blockable: Blockable,
    /// Payload is a repacked jar identified by a shared-resource key.
    pub is_repacked_jar: bool,
    /// When set, the payload bytes live in this earlier pack's stream.
    pub previous_pack_id: Option<String>,
    /// Byte offset of the payload in the previous pack, measured from just
    /// past the stream's framing header.
    pub offset_in_previous_pack: u64,
    /// Skipped unless the condition evaluator says true.
    pub condition: Option<String>,
    /// Skipped unless the current platform matches one of these.
    pub os_constraints: Vec<String>,
}

impl PackFile {
    pub fn is_back_reference(&self) -> bool {
        self.previous_pack_id.is_some()
    }

    /// Whether the descriptor asks for the target mtime to be set.
    pub fn wants_mtime(&self) -> bool {
        self.last_modified >= 0
    }
}

/// A file rewritten by the variable-substitution pass after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsableFile {
    pub target_path: String,
    pub condition: Option<String>,
}

/// When an executable entry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStage {
    /// Run right after all packs are extracted.
    Postinstall,
    /// Registered for the uninstaller; never run by this engine.
    Uninstall,
    /// Never run; entry exists only to control `keep_file`.
    Never,
}

impl ExecutionStage {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ExecutionStage::Postinstall),
            1 => Some(ExecutionStage::Uninstall),
            2 => Some(ExecutionStage::Never),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ExecutionStage::Postinstall => 0,
            ExecutionStage::Uninstall => 1,
            ExecutionStage::Never => 2,
        }
    }
}

/// What a spawn failure or non-zero exit of an executable entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the installation.
    Abort,
    /// Log a warning and continue.
    Warn,
}

impl FailurePolicy {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FailurePolicy::Abort),
            1 => Some(FailurePolicy::Warn),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            FailurePolicy::Abort => 0,
            FailurePolicy::Warn => 1,
        }
    }
}

/// An installed file to execute (or register) after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableFile {
    pub target_path: String,
    pub stage: ExecutionStage,
    pub on_failure: FailurePolicy,
    pub args: Vec<String>,
    /// Keep the file on disk after execution.
    pub keep_file: bool,
    pub condition: Option<String>,
}

/// Include/exclude glob patterns for the update-install cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

/// The trailing metadata lists of one pack stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackTrailers {
    pub parsables: Vec<ParsableFile>,
    pub executables: Vec<ExecutableFile>,
    pub update_checks: Vec<UpdateCheck>,
}

/// One entry of the caller-supplied ordered selection. Pack-level metadata
/// (condition, loose bundling) comes from here; the file descriptors come
/// from the pack's byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPack {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    /// Front-end passthrough: marks selections a chooser should not list.
    /// The engine installs hidden packs like any other and only carries the
    /// flag through to the installation metadata.
    #[serde(default)]
    pub hidden: bool,
    /// Loosely-bundled pack: descriptors carry no inline payload; bytes are
    /// resolved from the install-source directory at install time.
    #[serde(default)]
    pub loose: bool,
}

impl SelectedPack {
    pub fn named(name: impl Into<String>) -> Self {
        SelectedPack {
            name: name.into(),
            condition: None,
            hidden: false,
            loose: false,
        }
    }
}

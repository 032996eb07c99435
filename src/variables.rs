//! Collaborator surfaces
//!
//! The engine consumes condition evaluation, variable substitution, user
//! prompting and progress/lifecycle reporting as opaque services supplied
//! by the surrounding installer. Small default implementations suitable
//! for the CLI and tests live here too.

use crate::pack::SelectedPack;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Per-pack / per-file inclusion predicate: condition ids plus OS-constraint
/// matching.
pub trait Conditions: Send {
    fn is_true(&self, condition_id: &str) -> bool;
    fn os_matches(&self, constraint: &str) -> bool;
}

/// Opaque path/text variable-substitution service.
pub trait VariableSubstitutor: Send {
    fn substitute(&self, text: &str) -> String;
    /// Snapshot of the resolved variable set, persisted into the
    /// installation metadata after a successful run.
    fn snapshot(&self) -> BTreeMap<String, String>;
}

/// Answer to a user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    Cancel,
}

/// User-prompt collaborator returning small enumerated answers.
pub trait PromptHandler: Send {
    /// Ask whether an existing target should be overwritten; `default_yes`
    /// carries the override policy's default answer.
    fn ask_overwrite(&self, target: &Path, default_yes: bool) -> PromptAnswer;

    /// Emit a warning the user may react to (e.g. a missing loose file).
    /// `Cancel` aborts the installation; anything else continues.
    fn warn(&self, message: &str) -> PromptAnswer;
}

/// Lifecycle hooks around packs, files and directory creation. All methods
/// default to no-ops.
///
/// A queued (blockable) file receives `before_file` but never `after_file`,
/// not even when the queue later commits. This mirrors the reference
/// behavior and is deliberate.
pub trait UnpackListener: Send {
    fn before_packs(&mut self, _total: usize) {}
    fn before_pack(&mut self, _pack: &SelectedPack, _index: usize) {}
    fn after_pack(&mut self, _pack: &SelectedPack, _index: usize) {}
    fn before_file(&mut self, _target: &Path) {}
    fn after_file(&mut self, _target: &Path) {}
    fn before_dir(&mut self, _dir: &Path) {}
    fn after_dir(&mut self, _dir: &Path) {}
    fn after_packs(&mut self) {}
}

/// Progress events for the reporting sink.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Extraction starting; total number of selected packs.
    StartUnpack { total_packs: usize },
    /// A pack's stream was opened; carries its declared file count.
    PackBegin { name: String, files: u32 },
    /// One file finished (or was skipped).
    FileDone { path: String },
    /// Extraction finished, successfully or not.
    Stopped,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Conditions implementation backed by a set of true condition ids and a
/// current-platform name.
pub struct StaticConditions {
    true_conditions: Vec<String>,
    platform: String,
}

impl StaticConditions {
    pub fn new(true_conditions: Vec<String>, platform: impl Into<String>) -> Self {
        StaticConditions {
            true_conditions,
            platform: platform.into(),
        }
    }

    /// Everything true, current platform taken from the build target.
    pub fn accept_all() -> Self {
        StaticConditions {
            true_conditions: Vec::new(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl Conditions for StaticConditions {
    fn is_true(&self, condition_id: &str) -> bool {
        self.true_conditions.is_empty() || self.true_conditions.iter().any(|c| c == condition_id)
    }

    fn os_matches(&self, constraint: &str) -> bool {
        constraint.eq_ignore_ascii_case(&self.platform)
    }
}

/// Substitutor over a fixed variable map; replaces `${name}` occurrences.
/// Unknown variables are left as-is.
pub struct MapSubstitutor {
    vars: BTreeMap<String, String>,
}

impl MapSubstitutor {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        MapSubstitutor { vars }
    }
}

impl VariableSubstitutor for MapSubstitutor {
    fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.vars.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }
}

/// Prompt handler that always answers with the supplied default and never
/// cancels on warnings. Used by the non-interactive CLI and tests.
pub struct AutoPrompt;

impl PromptHandler for AutoPrompt {
    fn ask_overwrite(&self, _target: &Path, default_yes: bool) -> PromptAnswer {
        if default_yes {
            PromptAnswer::Yes
        } else {
            PromptAnswer::No
        }
    }

    fn warn(&self, message: &str) -> PromptAnswer {
        tracing::warn!("{message}");
        PromptAnswer::Yes
    }
}

/// Listener that ignores every event.
pub struct NoopListener;

impl UnpackListener for NoopListener {}

//! Unpack orchestrator
//!
//! Coordinates one installation run:
//! 1. Open each selected pack's stream in order, skipping packs and files
//!    whose conditions or OS constraints exclude them (their payload bytes
//!    are still consumed so the stream stays in sync)
//! 2. Resolve overwrite policy against pre-existing targets, apply
//!    overwrite-renames, dispatch to the unpacker variant, queue blockable
//!    targets
//! 3. Post-process: commit the file queue, substitute variables into
//!    parsable files, run post-install executables, clean stale files on
//!    update installs, persist installation metadata
//!
//! Extraction runs on one dedicated worker; the cancellation gate is the
//! only state shared with the caller. A fatal error unwinds to `run`,
//! which classifies it as cancellation or failure. Already-written files
//! are not rolled back.

pub mod cleanup;
pub mod config;
pub mod copy;
pub mod gate;
pub mod handlers;
pub mod queue;

pub use config::{PlatformCapabilities, UnpackConfig};
pub use gate::{CancellationGate, GateState};

use crate::error::{Result, UnpackError};
use crate::metadata;
use crate::pack::stream::PackStreamReader;
use crate::pack::{
    ExecutableFile, ExecutionStage, FailurePolicy, OverridePolicy, PackFile, ParsableFile,
    SelectedPack, UpdateCheck,
};
use crate::paths;
use crate::resources::ResourceProvider;
use crate::uninstall::UninstallLog;
use crate::variables::{
    AutoPrompt, Conditions, NoopListener, ProgressCallback, ProgressEvent, PromptAnswer,
    PromptHandler, UnpackListener, VariableSubstitutor,
};

use handlers::{unpack_direct, unpack_loose, unpack_repacked_jar, LooseOutcome};
use queue::FileQueue;

use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct UnpackSummary {
    /// Every path created, in creation order, duplicates allowed. Feeds
    /// the uninstaller.
    pub installed_paths: Vec<PathBuf>,
    /// Whether committed queued replacements only take effect after a
    /// reboot.
    pub reboot_necessary: bool,
}

/// Pack-extraction orchestrator. One instance per installation run.
pub struct Unpacker {
    config: UnpackConfig,
    resources: ResourceProvider,
    packs: Vec<SelectedPack>,
    conditions: Box<dyn Conditions>,
    substitutor: Box<dyn VariableSubstitutor>,
    prompt: Box<dyn PromptHandler>,
    listener: Box<dyn UnpackListener>,
    progress: Option<ProgressCallback>,
    gate: Arc<CancellationGate>,
    queue: Option<FileQueue>,
    uninstall_log: UninstallLog,
    parsables: Vec<ParsableFile>,
    executables: Vec<ExecutableFile>,
    update_checks: Vec<UpdateCheck>,
}

impl Unpacker {
    pub fn new(
        config: UnpackConfig,
        resources: ResourceProvider,
        packs: Vec<SelectedPack>,
        conditions: Box<dyn Conditions>,
        substitutor: Box<dyn VariableSubstitutor>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| UnpackError::Config(e.to_string()))?;
        fs::create_dir_all(&config.install_dir)
            .map_err(|e| UnpackError::fs(&config.install_dir, e))?;

        let queue = config
            .capabilities
            .deferred_file_queue
            .then(|| FileQueue::new(&config.install_dir));

        Ok(Unpacker {
            config,
            resources,
            packs,
            conditions,
            substitutor,
            prompt: Box::new(AutoPrompt),
            listener: Box::new(NoopListener),
            progress: None,
            gate: Arc::new(CancellationGate::new()),
            queue,
            uninstall_log: UninstallLog::new(),
            parsables: Vec::new(),
            executables: Vec::new(),
            update_checks: Vec::new(),
        })
    }

    pub fn with_prompt(mut self, prompt: Box<dyn PromptHandler>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn UnpackListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The gate shared with whoever may want to interrupt this run.
    pub fn gate(&self) -> Arc<CancellationGate> {
        self.gate.clone()
    }

    /// Run extraction on a dedicated worker thread. The handle exposes the
    /// interrupt-request/acknowledge protocol to the caller.
    pub fn spawn(self) -> UnpackerHandle {
        let gate = self.gate.clone();
        let thread = std::thread::spawn(move || {
            let mut unpacker = self;
            unpacker.run()
        });
        UnpackerHandle { gate, thread }
    }

    /// Run extraction on the current thread.
    pub fn run(&mut self) -> Result<UnpackSummary> {
        self.gate.begin();
        let result = self.run_inner();
        match &result {
            Ok(summary) => {
                self.gate.finish();
                info!(
                    "installation complete: {} paths, reboot={}",
                    summary.installed_paths.len(),
                    summary.reboot_necessary
                );
            }
            Err(e) if e.is_cancellation() => {
                info!("installation cancelled by the user");
            }
            Err(e) => {
                error!("installation failed: {e}");
            }
        }
        self.report(ProgressEvent::Stopped);
        result
    }

    fn run_inner(&mut self) -> Result<UnpackSummary> {
        self.report(ProgressEvent::StartUnpack {
            total_packs: self.packs.len(),
        });
        self.listener.before_packs(self.packs.len());

        let packs = self.packs.clone();
        for (index, pack) in packs.iter().enumerate() {
            if !self.pack_included(pack) {
                debug!("pack {} excluded by condition", pack.name);
                continue;
            }
            self.listener.before_pack(pack, index);
            info!("unpacking pack {}", pack.name);

            let stream = self.resources.open_pack(&pack.name, Some(self.gate.as_ref()))?;
            let mut reader = PackStreamReader::open(stream)?;
            self.report(ProgressEvent::PackBegin {
                name: pack.name.clone(),
                files: reader.file_count(),
            });

            for _ in 0..reader.file_count() {
                let file = reader.next_file()?;
                if self.file_included(&file) {
                    self.install_file(pack, &file, &mut reader)?;
                } else {
                    debug!("skipping {} (condition/OS)", file.target_path);
                    reader.skip_payload(&file, pack.loose)?;
                }
                self.report(ProgressEvent::FileDone {
                    path: file.target_path.clone(),
                });
                if self.gate.check() {
                    return Err(UnpackError::Cancelled);
                }
            }

            let trailers = reader.read_trailers()?;
            self.parsables.extend(trailers.parsables);
            self.executables.extend(trailers.executables);
            self.update_checks.extend(trailers.update_checks);
            self.listener.after_pack(pack, index);
        }

        let reboot_necessary = self.post_process()?;
        self.listener.after_packs();
        Ok(UnpackSummary {
            installed_paths: self.uninstall_log.entries().to_vec(),
            reboot_necessary,
        })
    }

    fn pack_included(&self, pack: &SelectedPack) -> bool {
        pack.condition
            .as_deref()
            .map(|c| self.conditions.is_true(c))
            .unwrap_or(true)
    }

    fn file_included(&self, file: &PackFile) -> bool {
        let condition_ok = file
            .condition
            .as_deref()
            .map(|c| self.conditions.is_true(c))
            .unwrap_or(true);
        let os_ok = file.os_constraints.is_empty()
            || file.os_constraints.iter().any(|c| self.conditions.os_matches(c));
        condition_ok && os_ok
    }

    /// Extract (or skip) one included descriptor whose payload is at the
    /// reader's current position.
    fn install_file<R: Read + Seek>(
        &mut self,
        pack: &SelectedPack,
        file: &PackFile,
        reader: &mut PackStreamReader<R>,
    ) -> Result<()> {
        let substituted = self.substitutor.substitute(&file.target_path);
        let target = paths::resolve_target(&self.config.install_dir, &substituted);

        if file.is_directory {
            self.create_dir_chain(&target)?;
            reader.skip_payload(file, pack.loose)?;
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            self.create_dir_chain(parent)?;
        }
        self.uninstall_log.record(&target);

        if target.exists() {
            if !self.should_overwrite(file, &target)? {
                debug!("keeping existing {}", target.display());
                reader.skip_payload(file, pack.loose)?;
                return Ok(());
            }
            if let Some(pattern) = &file.override_rename_to {
                self.rename_existing(&target, pattern)?;
            }
        }

        self.listener.before_file(&target);
        let queued = if pack.loose {
            match unpack_loose(
                &self.gate,
                file,
                &self.config.source_dir,
                &target,
                self.queue.as_mut(),
                self.prompt.as_ref(),
            )? {
                LooseOutcome::Installed { queued } => queued,
                LooseOutcome::Missing => return Ok(()),
            }
        } else if file.is_back_reference() {
            self.unpack_back_reference(file, &target)?
        } else if file.is_repacked_jar {
            let key = reader.read_jar_key()?;
            unpack_repacked_jar(
                &self.gate,
                file,
                key,
                &self.resources,
                &target,
                self.queue.as_mut(),
            )?
        } else {
            let mut payload = reader.payload(file.length);
            unpack_direct(&self.gate, file, &mut payload, &target, self.queue.as_mut())?
        };

        // Queued files get no after-file event, not even at queue commit.
        if !queued {
            self.listener.after_file(&target);
        }
        Ok(())
    }

    /// Re-point the byte source at the previous pack's stream. Offsets are
    /// measured from just past the framing header, which `open` has
    /// already consumed, so the skip distance is the offset itself.
    fn unpack_back_reference(&mut self, file: &PackFile, target: &Path) -> Result<bool> {
        let previous = file
            .previous_pack_id
            .as_deref()
            .ok_or_else(|| UnpackError::CorruptPack("back-reference without pack id".into()))?;
        debug!(
            "resolving {} from pack {previous} at offset {}",
            file.target_path, file.offset_in_previous_pack
        );
        let stream = self.resources.open_pack(previous, Some(self.gate.as_ref()))?;
        let mut prev_reader = PackStreamReader::open(stream)?;
        prev_reader.skip_raw(file.offset_in_previous_pack)?;
        let mut payload = prev_reader.payload(file.length);
        unpack_direct(&self.gate, file, &mut payload, target, self.queue.as_mut())
    }

    /// Create every missing directory on the way to `dir` (inclusive),
    /// recording each in the uninstall log and firing the dir listeners
    /// around each mkdir.
    fn create_dir_chain(&mut self, dir: &Path) -> Result<()> {
        let mut to_create = paths::missing_ancestors(&self.config.install_dir, dir);
        if !dir.exists() {
            to_create.push(dir.to_path_buf());
        }
        for new_dir in to_create {
            self.listener.before_dir(&new_dir);
            fs::create_dir(&new_dir).map_err(|e| UnpackError::fs(&new_dir, e))?;
            self.uninstall_log.record(&new_dir);
            self.listener.after_dir(&new_dir);
        }
        Ok(())
    }

    /// Resolve the override policy against an existing target.
    fn should_overwrite(&self, file: &PackFile, target: &Path) -> Result<bool> {
        match file.override_policy {
            OverridePolicy::Always => Ok(true),
            OverridePolicy::Never => Ok(false),
            OverridePolicy::Update => Ok(target_mtime_millis(target) < file.last_modified),
            OverridePolicy::AskYes | OverridePolicy::AskNo => {
                let default_yes = file.override_policy == OverridePolicy::AskYes;
                match self.prompt.ask_overwrite(target, default_yes) {
                    PromptAnswer::Yes => Ok(true),
                    PromptAnswer::No => Ok(false),
                    PromptAnswer::Cancel => Err(UnpackError::Cancelled),
                }
            }
        }
    }

    /// Move a pre-existing target aside before overwriting it.
    fn rename_existing(&self, target: &Path, pattern: &str) -> Result<()> {
        let destination = paths::rename_target(target, pattern).ok_or_else(|| {
            UnpackError::Config(format!(
                "cannot compute rename target for {} from pattern {pattern}",
                target.display()
            ))
        })?;
        match fs::remove_file(&destination) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(UnpackError::fs(&destination, e)),
        }
        info!("renaming {} -> {}", target.display(), destination.display());
        fs::rename(target, &destination).map_err(|e| UnpackError::fs(target, e))
    }

    /// Everything that happens after the last pack: queue commit, parsable
    /// substitution, executables, update cleanup, metadata.
    fn post_process(&mut self) -> Result<bool> {
        let mut reboot_necessary = false;
        if let Some(queue) = self.queue.as_mut() {
            if !queue.is_empty() {
                info!("committing {} deferred file moves", queue.len());
                reboot_necessary = queue.execute()?;
            }
        }

        self.parse_files()?;
        let uninstall_executables = self.run_executables()?;

        if !self.update_checks.is_empty() {
            cleanup::run_update_checks(
                &self.config.install_dir,
                &self.update_checks,
                self.substitutor.as_ref(),
                &self.uninstall_log,
            )?;
        }

        let installed: Vec<SelectedPack> = self
            .packs
            .iter()
            .filter(|p| self.pack_included(p))
            .cloned()
            .collect();
        metadata::store(
            &self.config.install_dir,
            &installed,
            self.substitutor.snapshot(),
            uninstall_executables,
        )?;
        Ok(reboot_necessary)
    }

    /// Variable substitution over every accumulated parsable file whose
    /// condition holds, in accumulation order. Each failure is fatal and
    /// names the offending path.
    fn parse_files(&mut self) -> Result<()> {
        for parsable in &self.parsables {
            if let Some(condition) = &parsable.condition {
                if !self.conditions.is_true(condition) {
                    continue;
                }
            }
            let substituted = self.substitutor.substitute(&parsable.target_path);
            let path = paths::resolve_target(&self.config.install_dir, &substituted);
            debug!("substituting variables in {}", path.display());
            let content =
                fs::read_to_string(&path).map_err(|e| UnpackError::fs(&path, e))?;
            let rewritten = self.substitutor.substitute(&content);
            if rewritten != content {
                fs::write(&path, rewritten).map_err(|e| UnpackError::fs(&path, e))?;
            }
        }
        Ok(())
    }

    /// Run post-install executables; collect uninstall-stage entries for
    /// the metadata instead of running them.
    fn run_executables(&mut self) -> Result<Vec<ExecutableFile>> {
        let mut uninstall = Vec::new();
        for executable in &self.executables {
            if let Some(condition) = &executable.condition {
                if !self.conditions.is_true(condition) {
                    continue;
                }
            }
            let substituted = self.substitutor.substitute(&executable.target_path);
            let path = paths::resolve_target(&self.config.install_dir, &substituted);

            match executable.stage {
                ExecutionStage::Uninstall => {
                    uninstall.push(executable.clone());
                    continue;
                }
                ExecutionStage::Never => {}
                ExecutionStage::Postinstall => {
                    let args: Vec<String> = executable
                        .args
                        .iter()
                        .map(|a| self.substitutor.substitute(a))
                        .collect();
                    info!("running {} {}", path.display(), args.join(" "));
                    let failure = match Command::new(&path).args(&args).status() {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some(format!("{} exited with {status}", path.display())),
                        Err(e) => Some(format!("{}: {e}", path.display())),
                    };
                    if let Some(message) = failure {
                        match executable.on_failure {
                            FailurePolicy::Abort => {
                                return Err(UnpackError::ExecutionFailed(message))
                            }
                            FailurePolicy::Warn => warn!("{message}"),
                        }
                    }
                }
            }

            if !executable.keep_file {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("could not remove {}: {e}", path.display());
                }
            }
        }
        Ok(uninstall)
    }

    fn report(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }
}

/// Caller-side handle on a spawned extraction worker.
pub struct UnpackerHandle {
    gate: Arc<CancellationGate>,
    thread: JoinHandle<Result<UnpackSummary>>,
}

impl UnpackerHandle {
    /// Request interruption, blocking until the worker acknowledges or the
    /// timeout elapses. Returns whether interruption takes effect.
    pub fn interrupt(&self, timeout: Duration) -> bool {
        self.gate.interrupt(timeout)
    }

    /// Guard a critical section against interruption. Rejected once
    /// interruption has begun.
    pub fn set_interrupt_disabled(&self, disabled: bool) -> bool {
        self.gate.set_interrupt_disabled(disabled)
    }

    pub fn gate(&self) -> Arc<CancellationGate> {
        self.gate.clone()
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> Result<UnpackSummary> {
        self.thread.join().map_err(|_| UnpackError::WorkerPanicked)?
    }
}

/// Target mtime in epoch milliseconds; 0 when unreadable.
fn target_mtime_millis(target: &Path) -> i64 {
    fs::metadata(target)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
